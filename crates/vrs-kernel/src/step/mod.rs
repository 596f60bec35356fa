//! Model steps
//!
//! A [`ModelStep`] is the unit of change applied to a [`Model`]. Callers stage
//! additions and removals, run [`ModelStep::consolidate`] to restore a valid
//! topology, then [`ModelStep::apply`] the result. [`ModelStep::reversed`]
//! gives the exact undo of an applied step.

mod consolidate;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Vector3;
use crate::kernel::DisplayContext;
use crate::model::{
    Edge, EdgeId, Entity, EntityId, Face, FaceId, Group, GroupId, Model, ModelError, ModelResult,
};

/// Lifecycle of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    /// Staging additions and removals
    Building,
    /// Consolidated and checked
    Valid,
    /// Committed into a model
    Applied,
}

/// Re-parenting of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMove {
    pub group: GroupId,
    pub from: Option<GroupId>,
    pub to: Option<GroupId>,
}

/// A staged change to a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStep {
    /// Unique identifier
    pub id: Uuid,
    /// Display name ("Line", "Erase", ...)
    pub name: String,
    state: StepState,
    /// Staged entities, in display order
    fe_add: Vec<Entity>,
    /// Committed entities marked for deletion
    fe_remove: BTreeMap<EntityId, Entity>,
    /// `(old, new)`: selections of `old` follow to `new`
    edge_pairing: Vec<(EdgeId, EdgeId)>,
    groups_add: Vec<Group>,
    groups_remove: Vec<Group>,
    group_moves: Vec<GroupMove>,
}

impl ModelStep {
    /// Create an empty step
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: StepState::Building,
            fe_add: Vec::new(),
            fe_remove: BTreeMap::new(),
            edge_pairing: Vec::new(),
            groups_add: Vec::new(),
            groups_remove: Vec::new(),
            group_moves: Vec::new(),
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Staged entities, in order
    pub fn fe_add(&self) -> &[Entity] {
        &self.fe_add
    }

    /// Entities marked for deletion, edges first
    pub fn fe_remove(&self) -> impl Iterator<Item = &Entity> {
        self.fe_remove.values()
    }

    pub fn edge_pairing(&self) -> &[(EdgeId, EdgeId)] {
        &self.edge_pairing
    }

    pub fn groups_add(&self) -> &[Group] {
        &self.groups_add
    }

    pub fn group_moves(&self) -> &[GroupMove] {
        &self.group_moves
    }

    /// Whether applying this step would change nothing
    pub fn is_empty(&self) -> bool {
        self.fe_add.is_empty()
            && self.fe_remove.is_empty()
            && self.groups_add.is_empty()
            && self.groups_remove.is_empty()
            && self.group_moves.is_empty()
    }

    pub fn is_removed(&self, id: EntityId) -> bool {
        self.fe_remove.contains_key(&id)
    }

    pub fn is_staged(&self, id: EntityId) -> bool {
        self.staged_index(id).is_some()
    }

    /// Whether `id` exists once this step is applied
    pub fn is_active(&self, model: &Model, id: EntityId) -> bool {
        self.is_staged(id) || (model.contains(id) && !self.is_removed(id))
    }

    fn staged_index(&self, id: EntityId) -> Option<usize> {
        self.fe_add.iter().position(|e| e.id() == id)
    }

    fn staged_edges(&self) -> impl Iterator<Item = &Edge> {
        self.fe_add.iter().filter_map(Entity::as_edge)
    }

    fn staged_faces(&self) -> impl Iterator<Item = &Face> {
        self.fe_add.iter().filter_map(Entity::as_face)
    }

    fn staged_faces_mut(&mut self) -> impl Iterator<Item = &mut Face> {
        self.fe_add.iter_mut().filter_map(Entity::as_face_mut)
    }

    /// Staged edge, or the committed one
    pub fn lookup_edge<'a>(&'a self, model: &'a Model, id: EdgeId) -> Option<&'a Edge> {
        self.staged_edges()
            .find(|e| e.id == id)
            .or_else(|| model.edge(id))
    }

    /// Edges of `group` once this step is applied: committed edges first
    pub fn active_edges(&self, model: &Model, group: GroupId) -> Vec<Edge> {
        model
            .get_edges(group)
            .filter(|e| !self.is_removed(e.id.into()))
            .chain(self.staged_edges().filter(|e| e.group == group))
            .cloned()
            .collect()
    }

    /// Faces of `group` once this step is applied: committed faces first
    pub fn active_faces(&self, model: &Model, group: GroupId) -> Vec<Face> {
        model
            .get_faces(group)
            .filter(|f| !self.is_removed(f.id.into()))
            .chain(self.staged_faces().filter(|f| f.group == group))
            .cloned()
            .collect()
    }

    /// Groups whose content or hierarchy this step changes
    pub fn touched_groups(&self) -> BTreeSet<GroupId> {
        let mut groups: BTreeSet<GroupId> = self
            .fe_add
            .iter()
            .chain(self.fe_remove.values())
            .map(Entity::group)
            .collect();
        groups.extend(self.groups_add.iter().chain(&self.groups_remove).map(|g| g.id));
        for mv in &self.group_moves {
            groups.insert(mv.group);
            groups.extend(mv.from);
            groups.extend(mv.to);
        }
        groups
    }

    fn changes_hierarchy(&self) -> bool {
        !self.groups_add.is_empty() || !self.groups_remove.is_empty() || !self.group_moves.is_empty()
    }

    // ============== Staging ==============

    /// Edge from `v1` to `v2` in `group`.
    ///
    /// An active edge with the same endpoints in the same order is reused;
    /// otherwise a new edge is staged. `paired_with` records that selections
    /// of that older edge follow to the returned one.
    pub fn add_edge(
        &mut self,
        model: &Model,
        group: GroupId,
        v1: Vector3,
        v2: Vector3,
        paired_with: Option<EdgeId>,
    ) -> EdgeId {
        let existing = model
            .get_edges(group)
            .filter(|e| !self.is_removed(e.id.into()))
            .chain(self.staged_edges().filter(|e| e.group == group))
            .find(|e| e.has_endpoints(v1, v2))
            .map(|e| e.id);

        let id = match existing {
            Some(id) => id,
            None => {
                let edge = Edge::new(model.ids().next_edge(), group, v1, v2);
                let id = edge.id;
                self.fe_add.push(edge.into());
                id
            }
        };
        if let Some(old) = paired_with {
            self.edge_pairing.push((old, id));
        }
        id
    }

    /// Stage a face bounded by a closed loop of edges
    pub fn add_face(&mut self, model: &Model, edges: &[EdgeId]) -> ModelResult<FaceId> {
        let face = {
            let refs = edges
                .iter()
                .map(|id| {
                    self.lookup_edge(model, *id)
                        .ok_or(ModelError::EntityNotFound((*id).into()))
                })
                .collect::<ModelResult<Vec<&Edge>>>()?;
            Face::new(model.ids().next_face(), &refs, model.plane_fitter())?
        };
        let id = face.id;
        self.fe_add.push(face.into());
        Ok(id)
    }

    /// Stage the edges joining consecutive `vertices` (cyclically) and the
    /// face they bound
    pub fn add_polygon(
        &mut self,
        model: &Model,
        group: GroupId,
        vertices: &[Vector3],
    ) -> ModelResult<FaceId> {
        let n = vertices.len();
        let edges: Vec<EdgeId> = (0..n)
            .map(|i| self.add_edge(model, group, vertices[i], vertices[(i + 1) % n], None))
            .collect();
        self.add_face(model, &edges)
    }

    /// Remove an entity: a staged one is dropped, a committed one is marked
    /// for deletion
    pub fn remove(&mut self, model: &Model, id: EntityId) -> ModelResult<()> {
        if let Some(index) = self.staged_index(id) {
            self.fe_add.remove(index);
            if let EntityId::Edge(edge) = id {
                self.edge_pairing.retain(|(_, new)| *new != edge);
            }
            return Ok(());
        }
        let entity = model.entity(id).ok_or(ModelError::EntityNotFound(id))?;
        self.fe_remove.insert(id, entity);
        Ok(())
    }

    /// Remove an edge together with every active face bounded by it
    pub fn remove_edge_with_faces(&mut self, model: &Model, edge: EdgeId) -> ModelResult<()> {
        let group = self
            .lookup_edge(model, edge)
            .ok_or(ModelError::EntityNotFound(edge.into()))?
            .group;
        let faces: Vec<FaceId> = self
            .active_faces(model, group)
            .iter()
            .filter(|f| f.contains_edge(edge))
            .map(|f| f.id)
            .collect();
        for face in faces {
            self.remove(model, face.into())?;
        }
        self.remove(model, edge.into())
    }

    fn group_exists(&self, model: &Model, group: GroupId) -> bool {
        model.group(group).is_some() || self.groups_add.iter().any(|g| g.id == group)
    }

    /// Parent of `group` once this step is applied
    fn parent_of(&self, model: &Model, group: GroupId) -> Option<GroupId> {
        if let Some(mv) = self.group_moves.iter().rev().find(|m| m.group == group) {
            return mv.to;
        }
        self.groups_add
            .iter()
            .find(|g| g.id == group)
            .or_else(|| model.group(group))
            .and_then(|g| g.parent)
    }

    /// [`Model::is_subgroup`] including staged hierarchy changes
    pub fn is_subgroup(&self, model: &Model, group: GroupId, ancestor: GroupId) -> bool {
        let limit = model.groups().count() + self.groups_add.len();
        let mut current = Some(group);
        for _ in 0..=limit {
            match current {
                Some(g) if g == ancestor => return true,
                Some(g) => current = self.parent_of(model, g),
                None => return false,
            }
        }
        false
    }

    /// Stage a new empty group under `parent`
    pub fn new_group(&mut self, model: &Model, parent: GroupId) -> ModelResult<GroupId> {
        if !self.group_exists(model, parent) {
            return Err(ModelError::GroupNotFound(parent));
        }
        let group = Group::new(model.ids().next_group(), Some(parent));
        let id = group.id;
        self.groups_add.push(group);
        Ok(id)
    }

    /// Move the content of `group` into `target` and re-parent the direct
    /// children of `group` under `target`.
    ///
    /// Edges and faces are re-staged in `target`; each moved edge is paired
    /// with its original.
    pub fn move_group_in_hierarchy(
        &mut self,
        model: &Model,
        group: GroupId,
        target: GroupId,
    ) -> ModelResult<()> {
        if model.group(group).is_none() || group == model.root() {
            return Err(ModelError::GroupNotFound(group));
        }
        if !self.group_exists(model, target) {
            return Err(ModelError::GroupNotFound(target));
        }
        if self.is_subgroup(model, target, group) {
            return Err(ModelError::GroupCycle(group, target));
        }

        let edges = self.active_edges(model, group);
        let faces = self.active_faces(model, group);
        let mut moved = BTreeMap::new();
        for edge in &edges {
            self.remove(model, edge.id.into())?;
            let new = self.add_edge(model, target, edge.v1, edge.v2, Some(edge.id));
            moved.insert(edge.id, new);
        }
        for face in &faces {
            self.remove(model, face.id.into())?;
            let loop_edges: Vec<EdgeId> = face
                .edges
                .iter()
                .map(|e| moved.get(e).copied().ok_or(ModelError::EntityNotFound((*e).into())))
                .collect::<ModelResult<_>>()?;
            self.add_face(model, &loop_edges)?;
        }

        let children: Vec<GroupId> = model
            .groups()
            .map(|g| g.id)
            .chain(self.groups_add.iter().map(|g| g.id))
            .filter(|g| self.parent_of(model, *g) == Some(group))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for child in children {
            if let Some(staged) = self.groups_add.iter_mut().find(|g| g.id == child) {
                staged.parent = Some(target);
            } else {
                self.group_moves.push(GroupMove {
                    group: child,
                    from: Some(group),
                    to: Some(target),
                });
            }
        }
        tracing::debug!("Moved content of {} into {}", group, target);
        Ok(())
    }

    // ============== Validation ==============

    fn violation(message: String) -> ModelError {
        tracing::error!("{}", message);
        ModelError::InvariantViolation(message)
    }

    /// Check that applying this step leaves the model consistent
    pub fn check_valid(&self, model: &Model) -> ModelResult<()> {
        for entity in &self.fe_add {
            if model.contains(entity.id()) {
                return Err(Self::violation(format!("{} is added but already exists", entity.id())));
            }
            if !self.group_exists(model, entity.group()) {
                return Err(Self::violation(format!(
                    "{} is added to unknown group {}",
                    entity.id(),
                    entity.group()
                )));
            }
        }
        for id in self.fe_remove.keys() {
            if !model.contains(*id) {
                return Err(Self::violation(format!("{} is removed but does not exist", id)));
            }
        }

        for group in &self.groups_add {
            if model.group(group.id).is_some() {
                return Err(Self::violation(format!("{} is added but already exists", group.id)));
            }
        }
        for mv in &self.group_moves {
            if model.group(mv.group).is_none() {
                return Err(Self::violation(format!("{} is moved but does not exist", mv.group)));
            }
            if let Some(to) = mv.to {
                if !self.group_exists(model, to) {
                    return Err(Self::violation(format!("{} is moved to unknown group {}", mv.group, to)));
                }
            }
        }

        let mut seen = HashSet::new();
        for entity in &self.fe_add {
            if !seen.insert(entity.id()) {
                return Err(Self::violation(format!("{} is added twice", entity.id())));
            }
        }

        for face in self.staged_faces() {
            let active: HashSet<EdgeId> = self
                .active_edges(model, face.group)
                .iter()
                .map(|e| e.id)
                .collect();
            if let Some(missing) = face.edges.iter().find(|e| !active.contains(e)) {
                return Err(Self::violation(format!(
                    "{} references {} which is not an active edge of {}",
                    face.id, missing, face.group
                )));
            }
        }

        let groups: BTreeSet<GroupId> = self
            .fe_remove
            .values()
            .filter_map(Entity::as_edge)
            .map(|e| e.group)
            .collect();
        for group in groups {
            for face in model.get_faces(group) {
                if self.is_removed(face.id.into()) {
                    continue;
                }
                if let Some(edge) = face.edges.iter().find(|e| self.is_removed((**e).into())) {
                    return Err(Self::violation(format!(
                        "{} survives but its edge {} is removed",
                        face.id, edge
                    )));
                }
            }
        }
        Ok(())
    }

    // ============== Commit ==============

    /// Commit this step into `model` and notify `display`
    pub fn apply(&mut self, model: &mut Model, display: &mut dyn DisplayContext) -> ModelResult<()> {
        if self.state == StepState::Applied {
            return Err(ModelError::AlreadyApplied(self.name.clone()));
        }
        self.check_valid(model)?;
        let touched = self.touched_groups();

        for group in &self.groups_add {
            model.insert_group(group.clone());
        }
        for mv in &self.group_moves {
            model.set_parent(mv.group, mv.to)?;
        }
        for id in self.fe_remove.keys() {
            display.destroy(*id);
            model.remove_entity(*id);
        }
        for entity in &self.fe_add {
            model.insert_entity(entity.clone());
            display.display(entity);
        }

        if let Some(selection) = display.selected_edges_mut() {
            let followers: Vec<EdgeId> = self
                .edge_pairing
                .iter()
                .filter(|(old, _)| selection.contains(old))
                .map(|(_, new)| *new)
                .collect();
            selection.retain(|e| model.edge(*e).is_some());
            selection.extend(followers.into_iter().filter(|e| model.edge(*e).is_some()));
        }

        if self.changes_hierarchy() {
            model.clear_caches();
        } else {
            for group in &touched {
                model.invalidate_caches(*group);
            }
        }
        for group in &self.groups_remove {
            model.remove_group(group.id);
        }
        model.prune_empty_groups();

        tracing::debug!(
            "Applied step '{}': +{} -{}",
            self.name,
            self.fe_add.len(),
            self.fe_remove.len()
        );
        self.state = StepState::Applied;
        Ok(())
    }

    /// The step undoing this one
    pub fn reversed(&self) -> ModelStep {
        ModelStep {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            state: StepState::Valid,
            fe_add: self.fe_remove.values().cloned().collect(),
            fe_remove: self.fe_add.iter().map(|e| (e.id(), e.clone())).collect(),
            edge_pairing: self.edge_pairing.iter().map(|(old, new)| (*new, *old)).collect(),
            groups_add: self.groups_remove.clone(),
            groups_remove: self.groups_add.clone(),
            group_moves: self
                .group_moves
                .iter()
                .rev()
                .map(|mv| GroupMove {
                    group: mv.group,
                    from: mv.to,
                    to: mv.from,
                })
                .collect(),
        }
    }
}
