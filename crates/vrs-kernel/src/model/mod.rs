//! Model data: groups, edges and faces
//!
//! Entities live in arenas keyed by id. Each registered group keeps the
//! ordered lists of its edges and faces. Entities are only created inside a
//! [`ModelStep`](crate::step::ModelStep) and become part of the model when
//! that step is applied.

mod entity;
mod group;

use std::cell::RefCell;
use std::collections::HashMap;

pub use entity::{Edge, EdgeId, Entity, EntityId, Face, FaceId};
pub use group::{Group, GroupId};

pub(crate) use group::{GroupCache, IdAllocator};

use crate::geometry::Vector3;
use crate::kernel::{KernelError, PlaneFitter, default_plane_fitter};

/// Model-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),
    #[error("Face loop is open between {0} and {1}")]
    OpenLoop(EdgeId, EdgeId),
    #[error("Face mixes edges of groups {0} and {1}")]
    MixedGroups(GroupId, GroupId),
    #[error("Face has no edges")]
    EmptyFace,
    #[error("Moving {0} under {1} would create a cycle")]
    GroupCycle(GroupId, GroupId),
    #[error("Plane fit failed: {0}")]
    PlaneFit(#[from] KernelError),
    #[error("Step '{0}' was already applied")]
    AlreadyApplied(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Ordered content of a registered group
#[derive(Debug, Clone, Default)]
struct GroupContents {
    edges: Vec<EdgeId>,
    faces: Vec<FaceId>,
}

impl GroupContents {
    fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.faces.is_empty()
    }
}

/// The edge/face model
#[derive(Debug)]
pub struct Model {
    root: GroupId,
    /// Every known group, registered or not
    groups: HashMap<GroupId, Group>,
    edges: HashMap<EdgeId, Edge>,
    faces: HashMap<FaceId, Face>,
    /// Registered groups; the root is always registered
    contents: HashMap<GroupId, GroupContents>,
    ids: IdAllocator,
    plane_fitter: Box<dyn PlaneFitter>,
    /// Per-group caches (interior mutability for lazy evaluation)
    caches: RefCell<HashMap<GroupId, GroupCache>>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Create an empty model using the default plane solver
    pub fn new() -> Self {
        Self::with_plane_fitter(default_plane_fitter())
    }

    /// Create an empty model using a custom plane solver
    pub fn with_plane_fitter(plane_fitter: Box<dyn PlaneFitter>) -> Self {
        let root = GroupId(0);
        Self {
            root,
            groups: HashMap::from([(root, Group::new(root, None))]),
            edges: HashMap::new(),
            faces: HashMap::new(),
            contents: HashMap::from([(root, GroupContents::default())]),
            ids: IdAllocator::default(),
            plane_fitter,
            caches: RefCell::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> GroupId {
        self.root
    }

    pub fn plane_fitter(&self) -> &dyn PlaneFitter {
        self.plane_fitter.as_ref()
    }

    pub(crate) fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    // ============== Groups ==============

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Direct children of `parent`, sorted by id
    pub fn children(&self, parent: GroupId) -> Vec<GroupId> {
        let mut children: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| g.parent == Some(parent))
            .map(|g| g.id)
            .collect();
        children.sort();
        children
    }

    /// Whether `group` holds any edge or face (the root always does)
    pub fn is_registered(&self, group: GroupId) -> bool {
        self.contents.contains_key(&group)
    }

    /// Whether `ancestor` is `group` or one of its ancestors
    pub fn is_subgroup(&self, group: GroupId, ancestor: GroupId) -> bool {
        let mut current = Some(group);
        // Bounded by the number of groups so a corrupted tree cannot hang
        for _ in 0..=self.groups.len() {
            match current {
                Some(g) if g == ancestor => return true,
                Some(g) => current = self.groups.get(&g).and_then(|g| g.parent),
                None => return false,
            }
        }
        false
    }

    /// Every registered group below `group`, including `group` itself when
    /// registered, sorted by id
    pub fn get_subgroups(&self, group: GroupId) -> Vec<GroupId> {
        if let Some(cached) = self
            .caches
            .borrow()
            .get(&group)
            .and_then(|c| c.subgroups.clone())
        {
            return cached;
        }

        let mut subgroups: Vec<GroupId> = self
            .contents
            .keys()
            .copied()
            .filter(|g| self.is_subgroup(*g, group))
            .collect();
        subgroups.sort();
        self.caches.borrow_mut().entry(group).or_default().subgroups = Some(subgroups.clone());
        subgroups
    }

    /// Run `f` on the cache of `group`
    pub(crate) fn with_group_cache<R>(&self, group: GroupId, f: impl FnOnce(&mut GroupCache) -> R) -> R {
        let mut caches = self.caches.borrow_mut();
        f(caches.entry(group).or_default())
    }

    /// Drop the caches of `group` and of all its ancestors
    pub(crate) fn invalidate_caches(&self, group: GroupId) {
        let mut caches = self.caches.borrow_mut();
        let mut current = Some(group);
        for _ in 0..=self.groups.len() {
            let Some(g) = current else { break };
            caches.remove(&g);
            current = self.groups.get(&g).and_then(|g| g.parent);
        }
    }

    pub(crate) fn clear_caches(&self) {
        self.caches.borrow_mut().clear();
    }

    pub(crate) fn insert_group(&mut self, group: Group) {
        self.ids.observe_group(group.id);
        self.groups.insert(group.id, group);
    }

    pub(crate) fn remove_group(&mut self, id: GroupId) -> Option<Group> {
        if id == self.root {
            return None;
        }
        self.contents.remove(&id);
        self.groups.remove(&id)
    }

    pub(crate) fn set_parent(&mut self, id: GroupId, parent: Option<GroupId>) -> ModelResult<()> {
        let group = self.groups.get_mut(&id).ok_or(ModelError::GroupNotFound(id))?;
        group.parent = parent;
        Ok(())
    }

    /// Unregister every non-root group left without edges and faces
    pub(crate) fn prune_empty_groups(&mut self) {
        let root = self.root;
        self.contents.retain(|id, contents| {
            let keep = *id == root || !contents.is_empty();
            if !keep {
                tracing::debug!("Unregistering empty group {}", id);
            }
            keep
        });
    }

    // ============== Entities ==============

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match id {
            EntityId::Edge(id) => self.edges.contains_key(&id),
            EntityId::Face(id) => self.faces.contains_key(&id),
        }
    }

    /// Clone of the entity with the given id
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        match id {
            EntityId::Edge(id) => self.edges.get(&id).cloned().map(Entity::Edge),
            EntityId::Face(id) => self.faces.get(&id).cloned().map(Entity::Face),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Edges of one group, in insertion order
    pub fn get_edges(&self, group: GroupId) -> impl Iterator<Item = &Edge> {
        self.contents
            .get(&group)
            .into_iter()
            .flat_map(|c| c.edges.iter())
            .filter_map(|id| self.edges.get(id))
    }

    /// Faces of one group, in insertion order
    pub fn get_faces(&self, group: GroupId) -> impl Iterator<Item = &Face> {
        self.contents
            .get(&group)
            .into_iter()
            .flat_map(|c| c.faces.iter())
            .filter_map(|id| self.faces.get(id))
    }

    /// All edges, grouped by group id then in insertion order
    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.get_subgroups(self.root)
            .into_iter()
            .flat_map(move |g| self.get_edges(g))
    }

    /// All faces, grouped by group id then in insertion order
    pub fn all_faces(&self) -> impl Iterator<Item = &Face> {
        self.get_subgroups(self.root)
            .into_iter()
            .flat_map(move |g| self.get_faces(g))
    }

    /// Endpoints of every edge (shared vertices are repeated)
    pub fn all_vertices(&self) -> impl Iterator<Item = Vector3> + '_ {
        self.all_edges().flat_map(|e| [e.v1, e.v2])
    }

    /// Add a committed entity, registering its group
    pub(crate) fn insert_entity(&mut self, entity: Entity) {
        let contents = self.contents.entry(entity.group()).or_default();
        match entity {
            Entity::Edge(edge) => {
                self.ids.observe_edge(edge.id);
                contents.edges.push(edge.id);
                self.edges.insert(edge.id, edge);
            }
            Entity::Face(face) => {
                self.ids.observe_face(face.id);
                contents.faces.push(face.id);
                self.faces.insert(face.id, face);
            }
        }
    }

    /// Remove a committed entity from its arena and its group's list
    pub(crate) fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = match id {
            EntityId::Edge(id) => Entity::Edge(self.edges.remove(&id)?),
            EntityId::Face(id) => Entity::Face(self.faces.remove(&id)?),
        };
        if let Some(contents) = self.contents.get_mut(&entity.group()) {
            match id {
                EntityId::Edge(id) => contents.edges.retain(|e| *e != id),
                EntityId::Face(id) => contents.faces.retain(|f| *f != id),
            }
        }
        Some(entity)
    }
}
