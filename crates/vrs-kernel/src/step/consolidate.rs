//! Consolidation: restoring a valid topology after raw edits
//!
//! Staged edges that cross other edges are split at the crossing, faces
//! crossed by new edges are split in two, and degenerate staged entities
//! are dropped. Every pass reports whether it changed anything and is run
//! until it does not.

use std::collections::HashSet;
use std::f64::consts::TAU;

use super::{ModelStep, StepState};
use crate::constants::EPSILON;
use crate::geometry::{GeometryDict, Vector3};
use crate::model::{Edge, Entity, EntityId, Face, Model, ModelError, ModelResult};

/// Upper bound on the passes of one fixpoint loop
const MAX_PASSES: usize = 1000;

fn run_to_fixpoint(name: &str, mut pass: impl FnMut() -> bool) {
    for _ in 0..MAX_PASSES {
        if !pass() {
            return;
        }
    }
    tracing::warn!("{} did not converge after {} passes", name, MAX_PASSES);
}

/// Turn from `heading` to `direction` in the face plane, in `[0, 2π)`;
/// going straight is 0, left turns come before right turns
fn turn_angle(face: &Face, heading: Vector3, direction: Vector3) -> f64 {
    let (u, v) = face.basis;
    let (hx, hy) = (heading.dot(u), heading.dot(v));
    let (dx, dy) = (direction.dot(u), direction.dot(v));
    (hx * dy - hy * dx).atan2(hx * dx + hy * dy).rem_euclid(TAU)
}

impl ModelStep {
    /// Run the whole pipeline and check the result
    pub fn consolidate(&mut self, model: &Model) -> ModelResult<()> {
        if self.state == StepState::Applied {
            return Err(ModelError::AlreadyApplied(self.name.clone()));
        }
        self.consolidate_temporary(model);
        run_to_fixpoint("Edge subdivision", || self.consolidate_subdivide_edges(model));
        run_to_fixpoint("Face subdivision", || self.consolidate_subdivide_faces(model));
        self.cancel_noop_changes();
        self.check_valid(model)?;
        self.state = StepState::Valid;
        Ok(())
    }

    // ============== Degeneracies ==============

    /// Drop degenerate staged edges and the degenerate sides of staged faces.
    ///
    /// Endpoints that collapsed onto each other are rewritten to a single
    /// representative, preferring an endpoint of a committed edge.
    pub fn consolidate_temporary(&mut self, model: &Model) {
        let mut representatives: GeometryDict<Vector3, Vector3> = GeometryDict::new();
        while let Some(index) = self
            .fe_add
            .iter()
            .position(|e| e.as_edge().is_some_and(Edge::is_degenerate))
        {
            let Entity::Edge(edge) = self.fe_add.remove(index) else {
                continue;
            };
            tracing::warn!("Dropping degenerate edge {} at {}", edge.id, edge.v1);

            let representative = representatives
                .get(&edge.v1)
                .or_else(|| representatives.get(&edge.v2))
                .copied()
                .or_else(|| {
                    model
                        .get_edges(edge.group)
                        .filter(|e| !self.is_removed(e.id.into()))
                        .flat_map(|e| [e.v1, e.v2])
                        .find(|p| *p == edge.v1 || *p == edge.v2)
                })
                .unwrap_or(edge.v1);
            representatives.get_or_insert_with(edge.v1, || representative);
            representatives.get_or_insert_with(edge.v2, || representative);

            self.edge_pairing.retain(|(_, new)| *new != edge.id);
            for face in self.staged_faces_mut() {
                if let Some(k) = face.edges.iter().position(|e| *e == edge.id) {
                    face.edges.remove(k);
                    face.vertices.remove(k);
                }
            }
            self.rewrite_endpoints(&representatives);
        }

        let mut dropped = Vec::new();
        for face in self.staged_faces_mut() {
            let mut k = 0;
            while k < face.vertices.len() {
                let next = face.vertices[(k + 1) % face.vertices.len()];
                if face.vertices.len() > 1 && face.vertices[k].exactly_equal(&next) {
                    face.edges.remove(k);
                    face.vertices.remove(k);
                } else {
                    k += 1;
                }
            }
            if face.edges.len() < 3 {
                dropped.push(face.id);
            }
        }
        for id in dropped {
            tracing::warn!("Dropping degenerate face {}", id);
            self.fe_add.retain(|e| e.id() != EntityId::Face(id));
        }
    }

    fn rewrite_endpoints(&mut self, representatives: &GeometryDict<Vector3, Vector3>) {
        let rewrite = |p: &mut Vector3| {
            if let Some(r) = representatives.get(p) {
                *p = *r;
            }
        };
        for entity in &mut self.fe_add {
            match entity {
                Entity::Edge(edge) => {
                    rewrite(&mut edge.v1);
                    rewrite(&mut edge.v2);
                }
                Entity::Face(face) => face.vertices.iter_mut().for_each(rewrite),
            }
        }
    }

    // ============== Edge subdivision ==============

    /// Split edges at their crossings with staged edges.
    ///
    /// Committed edges crossed in their interior are first replaced by
    /// staged copies (re-pointing the faces that use them), then every
    /// staged edge crossed in its interior by an active edge is split in
    /// two. Returns whether anything changed.
    pub fn consolidate_subdivide_edges(&mut self, model: &Model) -> bool {
        let mut progress = false;

        let staged: Vec<Edge> = self.staged_edges().cloned().collect();
        for new_edge in &staged {
            let committed: Vec<Edge> = model.get_edges(new_edge.group).cloned().collect();
            for old in &committed {
                if self.is_removed(old.id.into()) {
                    continue;
                }
                let Some(point) = new_edge.intersect_edge(old) else {
                    continue;
                };
                if point.distance(old.v1) > 2.0 * EPSILON && point.distance(old.v2) > 2.0 * EPSILON {
                    self.replace_committed_edge(model, old);
                    progress = true;
                }
            }
        }

        let mut index = 0;
        while index < self.fe_add.len() {
            let Some(edge) = self.fe_add[index].as_edge().cloned() else {
                index += 1;
                continue;
            };
            let crossing = self
                .active_edges(model, edge.group)
                .iter()
                .filter(|other| other.id != edge.id)
                .find_map(|other| {
                    edge.intersect_edge(other).filter(|p| {
                        p.distance(edge.v1) > 2.0 * EPSILON && p.distance(edge.v2) > 2.0 * EPSILON
                    })
                });
            match crossing {
                Some(point) => {
                    self.split_staged_edge(model, index, point);
                    progress = true;
                }
                None => index += 1,
            }
        }
        progress
    }

    /// Mark a committed edge for deletion and stage an identical copy,
    /// re-pointing every face that uses it
    fn replace_committed_edge(&mut self, model: &Model, old: &Edge) {
        let replacement = Edge::new(model.ids().next_edge(), old.group, old.v1, old.v2);
        tracing::debug!("Replacing {} by {}", old.id, replacement.id);
        self.fe_remove.insert(old.id.into(), old.clone().into());
        self.edge_pairing.push((old.id, replacement.id));
        self.fe_add.push(replacement.clone().into());

        let faces: Vec<Face> = model
            .get_faces(old.group)
            .filter(|f| !self.is_removed(f.id.into()) && f.contains_edge(old.id))
            .cloned()
            .collect();
        for face in faces {
            self.fe_remove.insert(face.id.into(), face.clone().into());
            let mut copy = face.with_id(model.ids().next_face());
            copy.splice_edge(old.id, &[&replacement]);
            self.fe_add.push(copy.into());
        }
        for face in self.staged_faces_mut() {
            face.splice_edge(old.id, &[&replacement]);
        }
    }

    /// Replace the staged edge at `index` by its two halves around `point`
    fn split_staged_edge(&mut self, model: &Model, index: usize, point: Vector3) {
        let Entity::Edge(edge) = self.fe_add.remove(index) else {
            return;
        };
        let first = Edge::new(model.ids().next_edge(), edge.group, edge.v1, point);
        let second = Edge::new(model.ids().next_edge(), edge.group, point, edge.v2);
        tracing::debug!("Splitting {} at {} into {} and {}", edge.id, point, first.id, second.id);

        for face in self.staged_faces_mut() {
            face.splice_edge(edge.id, &[&first, &second]);
        }
        let mut pairing = Vec::with_capacity(self.edge_pairing.len() + 1);
        for (old, new) in self.edge_pairing.drain(..) {
            if new == edge.id {
                pairing.push((old, first.id));
                pairing.push((old, second.id));
            } else {
                pairing.push((old, new));
            }
        }
        self.edge_pairing = pairing;
        self.fe_add.push(first.into());
        self.fe_add.push(second.into());
    }

    // ============== Face subdivision ==============

    /// Split faces crossed by new edges.
    ///
    /// Tries every (staged edge, active face) and (staged face, active edge)
    /// pair of the same group. Returns whether a face was split.
    pub fn consolidate_subdivide_faces(&mut self, model: &Model) -> bool {
        let mut progress = false;

        let new_edges: Vec<Edge> = self.staged_edges().cloned().collect();
        for edge in &new_edges {
            for face in self.active_faces(model, edge.group) {
                progress |= self.subdivide_face(model, &face, edge);
            }
        }

        let new_faces: Vec<Face> = self.staged_faces().cloned().collect();
        for face in &new_faces {
            for edge in self.active_edges(model, face.group) {
                progress |= self.subdivide_face(model, face, &edge);
            }
        }
        progress
    }

    /// Split `face` along a boundary path starting with `edge`
    fn subdivide_face(&mut self, model: &Model, face: &Face, edge: &Edge) -> bool {
        if face.group != edge.group
            || !self.is_active(model, face.id.into())
            || !self.is_active(model, edge.id.into())
            || face.contains_edge(edge.id)
            || !edge.is_coplanar(&face.plane)
        {
            return false;
        }

        let n = face.vertices.len();
        let (start, next) = match (face.find_vertex(edge.v1), face.find_vertex(edge.v2)) {
            (Some(i), Some(j)) => {
                if i == j || (i + 1) % n == j || (j + 1) % n == i {
                    return false;
                }
                (edge.v1, edge.v2)
            }
            (Some(_), None) => (edge.v1, edge.v2),
            (None, Some(_)) => (edge.v2, edge.v1),
            (None, None) => return false,
        };
        if face.find_vertex(next).is_none() && face.boundary_distance(next) < EPSILON {
            return false;
        }
        let midpoint = edge.midpoint();
        if face.boundary_distance(midpoint) < EPSILON || !face.point_is_inside(midpoint) {
            return false;
        }

        let Some(path) = self.walk_boundary(model, face, start, next) else {
            tracing::warn!("No path across {} from {}", face.id, edge.id);
            return false;
        };
        self.split_face(model, face, &path)
    }

    /// Greedy angular walk from `start` through `next` until a vertex of the
    /// face is reached, backtracking on dead ends
    fn walk_boundary(
        &self,
        model: &Model,
        face: &Face,
        start: Vector3,
        next: Vector3,
    ) -> Option<Vec<Vector3>> {
        let edges: Vec<Edge> = self
            .active_edges(model, face.group)
            .into_iter()
            .filter(|e| e.is_coplanar(&face.plane))
            .collect();
        let mut path = vec![start, next];
        // choices[k]: untried continuations from path[k + 1], best last
        let mut choices: Vec<Vec<Vector3>> = Vec::new();

        loop {
            let current = path[path.len() - 1];
            if current != start && face.find_vertex(current).is_some() {
                tracing::trace!("Path across {} found: {:?}", face.id, path);
                return Some(path);
            }

            let heading = current - path[path.len() - 2];
            let mut candidates: Vec<(f64, Vector3)> = edges
                .iter()
                .filter_map(|e| {
                    let to = if e.v1 == current {
                        e.v2
                    } else if e.v2 == current {
                        e.v1
                    } else {
                        return None;
                    };
                    if path.iter().any(|p| *p == to) {
                        return None;
                    }
                    let on_face = face.find_vertex(to).is_some()
                        || (face.point_is_inside(to) && face.boundary_distance(to) >= EPSILON);
                    on_face.then(|| (turn_angle(face, heading, to - current), to))
                })
                .collect();
            candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
            choices.push(candidates.into_iter().map(|(_, p)| p).collect());

            loop {
                let options = choices.last_mut()?;
                match options.pop() {
                    Some(to) => {
                        path.push(to);
                        break;
                    }
                    None => {
                        choices.pop();
                        path.pop();
                        if path.len() < 2 {
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Replace `face` by the two faces on either side of `path`
    fn split_face(&mut self, model: &Model, face: &Face, path: &[Vector3]) -> bool {
        let (Some(i), Some(j)) = (
            face.find_vertex(path[0]),
            face.find_vertex(path[path.len() - 1]),
        ) else {
            return false;
        };
        let n = face.vertices.len();
        let arc = |from: usize, to: usize| {
            let mut out = Vec::new();
            let mut k = from;
            loop {
                out.push(face.vertices[k]);
                if k == to {
                    return out;
                }
                k = (k + 1) % n;
            }
        };
        let interior = &path[1..path.len() - 1];
        let mut first = arc(j, i);
        first.extend(interior.iter().copied());
        let mut second = arc(i, j);
        second.extend(interior.iter().rev().copied());

        let (mark_add, mark_pairing) = (self.fe_add.len(), self.edge_pairing.len());
        let result = self
            .add_polygon(model, face.group, &first)
            .and_then(|a| self.add_polygon(model, face.group, &second).map(|b| (a, b)));
        match result {
            Ok((a, b)) => {
                tracing::debug!("Split {} into {} and {}", face.id, a, b);
                if let Err(e) = self.remove(model, face.id.into()) {
                    tracing::warn!("Cannot remove split face {}: {}", face.id, e);
                }
                true
            }
            Err(e) => {
                tracing::warn!("Cannot split {}: {}", face.id, e);
                self.fe_add.truncate(mark_add);
                self.edge_pairing.truncate(mark_pairing);
                false
            }
        }
    }

    /// Drop entities that are both added and removed
    fn cancel_noop_changes(&mut self) {
        let added: HashSet<EntityId> = self.fe_add.iter().map(|e| e.id()).collect();
        let both: Vec<EntityId> = self
            .fe_remove
            .keys()
            .copied()
            .filter(|id| added.contains(id))
            .collect();
        for id in both {
            tracing::debug!("Cancelling no-op change of {}", id);
            self.fe_remove.remove(&id);
            self.fe_add.retain(|e| e.id() != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelError, KernelResult, NewellPlaneFit, NullDisplay, PlaneFitter};
    use crate::model::{EdgeId, FaceId};
    use crate::step::tests::{unit_square_model, v};

    /// Fits planes only through polygons of four or more points
    #[derive(Debug)]
    struct QuadsOnly;

    impl PlaneFitter for QuadsOnly {
        fn name(&self) -> &str {
            "quads-only"
        }

        fn approx_plane(&self, coords: &[f64]) -> KernelResult<[f64; 4]> {
            let count = coords.len() / 3;
            if count < 4 {
                return Err(KernelError::DegeneratePlane(count));
            }
            NewellPlaneFit.approx_plane(coords)
        }
    }

    fn edge_at(step: &ModelStep, index: usize) -> &Edge {
        step.fe_add()[index].as_edge().unwrap()
    }

    fn counts(step: &ModelStep) -> (usize, usize) {
        let edges = step.fe_add().iter().filter(|e| e.as_edge().is_some()).count();
        (edges, step.fe_add().len() - edges)
    }

    #[test]
    fn test_consolidate_subdivide_edges() {
        let (model, edges, face) = unit_square_model();
        let mut step = ModelStep::new("Split in two");
        step.add_edge(&model, model.root(), v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0), None);
        while step.consolidate_subdivide_edges(&model) {}

        let removed: Vec<EntityId> = step.fe_remove().map(Entity::id).collect();
        assert_eq!(removed.len(), 3);
        assert!(step.is_removed(face.into()));
        assert!(step.is_removed(edges[0].into()));
        assert!(!step.is_removed(edges[1].into()));
        assert!(step.is_removed(edges[2].into()));
        assert!(!step.is_removed(edges[3].into()));

        assert_eq!(step.fe_add().len(), 6);
        assert!(edge_at(&step, 0).has_endpoints(v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0)));
        assert!(edge_at(&step, 2).has_endpoints(v(0.0, 0.0, 1.0), v(0.5, 0.0, 1.0)));
        assert!(edge_at(&step, 3).has_endpoints(v(0.5, 0.0, 1.0), v(1.0, 0.0, 1.0)));
        assert!(edge_at(&step, 4).has_endpoints(v(1.0, 1.0, 1.0), v(0.5, 1.0, 1.0)));
        assert!(edge_at(&step, 5).has_endpoints(v(0.5, 1.0, 1.0), v(0.0, 1.0, 1.0)));

        let new_face = step.fe_add()[1].as_face().unwrap();
        let id = |i: usize| step.fe_add()[i].as_edge().unwrap().id;
        assert_eq!(
            new_face.edges,
            vec![id(2), id(3), edges[1], id(4), id(5), edges[3]]
        );
        step.check_valid(&model).unwrap();
    }

    #[test]
    fn test_subdivide_edges_pairs_halves() {
        let (model, edges, _) = unit_square_model();
        let mut step = ModelStep::new("Split in two");
        step.add_edge(&model, model.root(), v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0), None);
        while step.consolidate_subdivide_edges(&model) {}

        let followers: Vec<EdgeId> = step
            .edge_pairing()
            .iter()
            .filter(|(old, _)| *old == edges[0])
            .map(|(_, new)| *new)
            .collect();
        assert_eq!(followers, vec![edge_at(&step, 2).id, edge_at(&step, 3).id]);
    }

    #[test]
    fn test_touching_corner_does_not_split() {
        let (model, _, _) = unit_square_model();
        let mut step = ModelStep::new("Touch");
        step.add_edge(&model, model.root(), v(1.0, 1.0, 1.0), v(2.0, 2.0, 1.0), None);
        assert!(!step.consolidate_subdivide_edges(&model));
        assert_eq!(step.fe_remove().count(), 0);
    }

    #[test]
    fn test_t_junction_splits_committed_edge() {
        let (model, edges, face) = unit_square_model();
        let mut step = ModelStep::new("Touch");
        step.add_edge(&model, model.root(), v(1.0, 0.5, 1.0), v(2.0, 0.5, 1.0), None);
        assert!(step.consolidate_subdivide_edges(&model));
        assert!(!step.consolidate_subdivide_edges(&model));

        assert!(step.is_removed(edges[1].into()));
        assert!(step.is_removed(face.into()));
        let new_face = step.fe_add()[1].as_face().unwrap();
        assert_eq!(new_face.edges.len(), 5);
        assert!(new_face.find_vertex(v(1.0, 0.5, 1.0)).is_some());
        assert!(edge_at(&step, 2).has_endpoints(v(1.0, 0.0, 1.0), v(1.0, 0.5, 1.0)));
        assert!(edge_at(&step, 3).has_endpoints(v(1.0, 0.5, 1.0), v(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_diagonal_split() {
        let (model, _, face) = unit_square_model();
        let mut step = ModelStep::new("Diagonal");
        step.add_edge(&model, model.root(), v(0.0, 0.0, 1.0), v(1.0, 1.0, 1.0), None);
        while step.consolidate_subdivide_faces(&model) {}

        let removed: Vec<EntityId> = step.fe_remove().map(Entity::id).collect();
        assert_eq!(removed, vec![EntityId::Face(face)]);
        assert_eq!(counts(&step), (2, 2));
        step.check_valid(&model).unwrap();

        for entity in step.fe_add() {
            if let Some(f) = entity.as_face() {
                assert_eq!(f.edges.len(), 3);
            }
        }
    }

    #[test]
    fn test_failed_split_is_rolled_back() {
        let mut model = Model::with_plane_fitter(Box::new(QuadsOnly));
        let root = model.root();
        let mut initial = ModelStep::new("Square");
        let corners = [v(0.0, 0.0, 1.0), v(1.0, 0.0, 1.0), v(1.0, 1.0, 1.0), v(0.0, 1.0, 1.0)];
        let edges: Vec<EdgeId> = (0..4)
            .map(|i| initial.add_edge(&model, root, corners[i], corners[(i + 1) % 4], None))
            .collect();
        let face = initial.add_face(&model, &edges).unwrap();
        initial.apply(&mut model, &mut NullDisplay).unwrap();

        let mut step = ModelStep::new("Diagonal");
        let diagonal = step.add_edge(&model, root, v(0.0, 0.0, 1.0), v(1.0, 1.0, 1.0), None);
        assert!(!step.consolidate_subdivide_faces(&model));
        assert_eq!(step.fe_add().len(), 1);
        assert_eq!(step.fe_add()[0].id(), EntityId::Edge(diagonal));
        assert!(step.edge_pairing().is_empty());
        assert_eq!(step.fe_remove().count(), 0);

        step.consolidate(&model).unwrap();
        assert_eq!(step.fe_add().len(), 1);
        assert_eq!(step.fe_remove().count(), 0);
        step.apply(&mut model, &mut NullDisplay).unwrap();
        assert!(model.face(face).is_some());
        assert_eq!(model.face_count(), 1);
        assert_eq!(model.edge_count(), 5);
    }

    #[test]
    fn test_consolidate_after_apply_fails() {
        let (mut model, _, _) = unit_square_model();
        let mut step = ModelStep::new("Split");
        step.add_edge(&model, model.root(), v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0), None);
        step.consolidate(&model).unwrap();
        step.apply(&mut model, &mut NullDisplay).unwrap();
        assert!(matches!(step.consolidate(&model), Err(ModelError::AlreadyApplied(_))));
    }

    #[test]
    fn test_triangle_insertion() {
        let (model, edges, face) = unit_square_model();
        let root = model.root();
        let mut step = ModelStep::new("Triangle");
        step.add_edge(&model, root, v(0.0, 0.0, 1.0), v(0.5, 0.5, 1.0), None);
        step.add_edge(&model, root, v(0.5, 0.5, 1.0), v(1.0, 0.0, 1.0), None);

        assert!(step.consolidate_subdivide_faces(&model));
        assert!(!step.consolidate_subdivide_faces(&model));

        let removed: Vec<EntityId> = step.fe_remove().map(Entity::id).collect();
        assert_eq!(removed, vec![EntityId::Face(face)]);
        assert_eq!(counts(&step), (4, 2));

        let faces: Vec<&Face> = step.fe_add().iter().filter_map(Entity::as_face).collect();
        assert_eq!(faces[0].vertices.len(), 5);
        assert_eq!(faces[1].vertices.len(), 3);
        assert!(faces[1].contains_edge(edges[0]));
        assert!(faces[0].point_is_inside(v(0.5, 0.8, 1.0)));
        assert!(faces[1].point_is_inside(v(0.5, 0.2, 1.0)));
        step.check_valid(&model).unwrap();
    }

    #[test]
    fn test_walk_through_interior_points() {
        let (model, _, face) = unit_square_model();
        let root = model.root();
        let mut step = ModelStep::new("Zigzag");
        let points = [
            v(0.0, 0.0, 1.0),
            v(0.3, 0.4, 1.0),
            v(0.6, 0.3, 1.0),
            v(1.0, 1.0, 1.0),
        ];
        for pair in points.windows(2) {
            step.add_edge(&model, root, pair[0], pair[1], None);
        }
        // Dead end branching off the path
        step.add_edge(&model, root, v(0.3, 0.4, 1.0), v(0.2, 0.8, 1.0), None);
        step.consolidate(&model).unwrap();

        assert!(step.is_removed(face.into()));
        let faces: Vec<&Face> = step.fe_add().iter().filter_map(Entity::as_face).collect();
        assert_eq!(faces.len(), 2);
        let sizes: Vec<usize> = faces.iter().map(|f| f.vertices.len()).collect();
        assert_eq!(sizes, vec![5, 5]);
    }

    #[test]
    fn test_edge_outside_face_is_ignored() {
        let (model, _, _) = unit_square_model();
        let mut step = ModelStep::new("Outside");
        step.add_edge(&model, model.root(), v(1.0, 0.0, 1.0), v(2.0, 1.0, 1.0), None);
        assert!(!step.consolidate_subdivide_faces(&model));
        step.add_edge(&model, model.root(), v(0.0, 0.0, 1.0), v(1.0, 1.0, 2.0), None);
        assert!(!step.consolidate_subdivide_faces(&model));
    }

    #[test]
    fn test_consolidate_temporary_drops_degenerates() {
        let (model, _, _) = unit_square_model();
        let root = model.root();
        let mut step = ModelStep::new("Degenerate");
        let a = v(1.0, 1.0, 1.0 + 3e-6);
        let b = v(1.0, 1.0 + 3e-6, 1.0);
        step.add_edge(&model, root, a, b, None);
        let other = step.add_edge(&model, root, b, v(3.0, 3.0, 3.0), None);
        step.consolidate_temporary(&model);

        assert_eq!(step.fe_add().len(), 1);
        let kept = step.fe_add()[0].as_edge().unwrap();
        assert_eq!(kept.id, other);
        // Snapped onto the committed corner
        assert!(kept.v1.exactly_equal(&v(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_consolidate_temporary_drops_collapsed_faces() {
        let model = Model::new();
        let root = model.root();
        let mut step = ModelStep::new("Sliver");
        let p = v(0.0, 0.0, 0.0);
        let q = v(1.0, 0.0, 0.0);
        let r = v(0.0, 1.0, 0.0);
        let face: FaceId = step.add_polygon(&model, root, &[p, q, r]).unwrap();
        step.consolidate_temporary(&model);
        assert!(step.is_staged(face.into()));

        let mut step = ModelStep::new("Collapsed");
        let near = q + v(0.0, 4e-6, 0.0);
        let a = step.add_edge(&model, root, p, q, None);
        let b = step.add_edge(&model, root, q, near, None);
        let c = step.add_edge(&model, root, near, r, None);
        let d = step.add_edge(&model, root, r, p, None);
        let face = step.add_face(&model, &[a, b, c, d]).unwrap();
        step.consolidate_temporary(&model);
        assert!(!step.is_staged(b.into()));
        let face = step.fe_add().iter().find_map(|e| e.as_face().filter(|f| f.id == face));
        assert_eq!(face.map(|f| f.edges.clone()), Some(vec![a, c, d]));

        // Two sides left: no longer a face
        let mut step = ModelStep::new("Degenerate triangle");
        let a = step.add_edge(&model, root, p, q, None);
        let b = step.add_edge(&model, root, q, near, None);
        let c = step.add_edge(&model, root, near, p, None);
        let face = step.add_face(&model, &[a, b, c]).unwrap();
        step.consolidate_temporary(&model);
        assert!(!step.is_staged(face.into()));
        assert!(!step.is_staged(b.into()));
        assert!(step.is_staged(a.into()));
        assert!(step.is_staged(c.into()));
    }

    #[test]
    fn test_cancel_noop_changes() {
        let (model, edges, _) = unit_square_model();
        let mut step = ModelStep::new("Merged");
        step.remove(&model, edges[0].into()).unwrap();
        let restored = model.entity(edges[0].into()).unwrap();
        step.fe_add.push(restored);
        step.add_edge(&model, model.root(), v(2.0, 0.0, 0.0), v(3.0, 0.0, 0.0), None);
        assert!(step.check_valid(&model).is_err());

        step.cancel_noop_changes();
        assert_eq!(step.fe_remove().count(), 0);
        assert_eq!(step.fe_add().len(), 1);
        assert!(!step.is_staged(edges[0].into()));
        step.check_valid(&model).unwrap();
    }

    #[test]
    fn test_consolidate_and_apply() {
        let (mut model, _, _) = unit_square_model();
        let mut step = ModelStep::new("Cross");
        step.add_edge(&model, model.root(), v(0.5, 0.0, 1.0), v(0.5, 1.0, 1.0), None);
        step.add_edge(&model, model.root(), v(0.0, 0.5, 1.0), v(1.0, 0.5, 1.0), None);
        step.consolidate(&model).unwrap();
        assert_eq!(step.state(), StepState::Valid);
        step.apply(&mut model, &mut NullDisplay).unwrap();

        assert_eq!(model.face_count(), 4);
        // 4 outer sides split in two, 2 inner segments split in two
        assert_eq!(model.edge_count(), 12 + 4);
        for face in model.all_faces() {
            assert_eq!(face.vertices.len(), 4);
            assert!(face.point_is_inside(face.vertices.iter().fold(Vector3::ZERO, |s, p| s + *p) / 4.0));
        }
    }
}
