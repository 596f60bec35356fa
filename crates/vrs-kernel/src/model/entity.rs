//! Edges, faces and their identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{GroupId, ModelError, ModelResult};
use crate::constants::EPSILON;
use crate::geometry::{Line, Plane, SinglePoint, Subspace, Vector3};
use crate::kernel::PlaneFitter;

/// Identifier of an edge, never reused within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// Identifier of a face, never reused within a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Identifier of either kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Edge(EdgeId),
    Face(FaceId),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Edge(id) => id.fmt(f),
            EntityId::Face(id) => id.fmt(f),
        }
    }
}

impl From<EdgeId> for EntityId {
    fn from(id: EdgeId) -> Self {
        EntityId::Edge(id)
    }
}

impl From<FaceId> for EntityId {
    fn from(id: FaceId) -> Self {
        EntityId::Face(id)
    }
}

/// A straight edge between two positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub group: GroupId,
    pub v1: Vector3,
    pub v2: Vector3,
}

impl Edge {
    pub fn new(id: EdgeId, group: GroupId, v1: Vector3, v2: Vector3) -> Self {
        Self { id, group, v1, v2 }
    }

    pub fn direction(&self) -> Vector3 {
        self.v2 - self.v1
    }

    pub fn length(&self) -> f64 {
        self.direction().length()
    }

    pub fn midpoint(&self) -> Vector3 {
        (self.v1 + self.v2) * 0.5
    }

    /// Both endpoints are epsilon-equal
    pub fn is_degenerate(&self) -> bool {
        self.v1 == self.v2
    }

    /// Same endpoints in the same order
    pub fn has_endpoints(&self, v1: Vector3, v2: Vector3) -> bool {
        self.v1 == v1 && self.v2 == v2
    }

    /// Fraction along the edge of the projection of `position`, and the
    /// distance from `position` to the infinite supporting line
    pub fn measure_distance(&self, position: Vector3) -> (f64, f64) {
        let p1 = self.direction();
        let p2 = position - self.v1;
        let length2 = p1.length_squared();
        let fraction = if length2 > 0.0 { p1.dot(p2) / length2 } else { 0.0 };
        (fraction, (p2 - p1 * fraction).length())
    }

    /// Distance from `position` to the segment
    pub fn distance_to_point(&self, position: Vector3) -> f64 {
        let (fraction, _) = self.measure_distance(position);
        let fraction = fraction.clamp(0.0, 1.0);
        position.distance(self.v1.lerp(self.v2, fraction))
    }

    /// Both endpoints lie on `plane`
    pub fn is_coplanar(&self, plane: &Plane) -> bool {
        plane.contains_point(self.v1) && plane.contains_point(self.v2)
    }

    /// Supporting line, or a point for a degenerate edge
    pub fn subspace(&self) -> Subspace {
        match self.direction().try_normalized() {
            Some(axis) => Line::new(self.v1, axis).into(),
            None => SinglePoint::new(self.v1).into(),
        }
    }

    /// Intersection point of two segments.
    ///
    /// Only coplanar, non-collinear segments whose intersection lies within
    /// both parameter ranges (endpoints included) intersect.
    pub fn intersect_edge(&self, other: &Edge) -> Option<Vector3> {
        let d1 = self.direction();
        let d2 = other.direction();
        let normal = d1.cross(d2);
        let normal_length2 = normal.length_squared();
        if normal_length2.sqrt() < EPSILON {
            return None;
        }
        let w = other.v1 - self.v1;
        if w.dot(normal).abs() / normal_length2.sqrt() >= EPSILON {
            return None;
        }
        let t = w.cross(d2).dot(normal) / normal_length2;
        let s = w.cross(d1).dot(normal) / normal_length2;
        let in_range = |value: f64, length: f64| {
            let tolerance = EPSILON / length;
            (-tolerance..=1.0 + tolerance).contains(&value)
        };
        if !in_range(t, d1.length()) || !in_range(s, d2.length()) {
            return None;
        }
        Some(self.v1 + d1 * t)
    }
}

/// A closed planar polygon bounded by edges of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: FaceId,
    pub group: GroupId,
    /// Cyclic edge loop, `edges[i - 1].v2 == edges[i].v1`
    pub edges: Vec<EdgeId>,
    /// Start vertex of each edge, parallel to `edges`
    pub vertices: Vec<Vector3>,
    pub plane: Plane,
    /// In-plane basis used by [`Face::point_is_inside`]
    pub basis: (Vector3, Vector3),
}

impl Face {
    /// Build a face from a closed loop of edges.
    ///
    /// The plane is the best fit through the loop's vertices.
    pub fn new(id: FaceId, edges: &[&Edge], fitter: &dyn PlaneFitter) -> ModelResult<Self> {
        let first = edges.first().ok_or(ModelError::EmptyFace)?;
        let group = first.group;
        if let Some(other) = edges.iter().find(|e| e.group != group) {
            return Err(ModelError::MixedGroups(group, other.group));
        }
        for (i, edge) in edges.iter().enumerate() {
            let previous = edges[(i + edges.len() - 1) % edges.len()];
            if previous.v2 != edge.v1 {
                return Err(ModelError::OpenLoop(previous.id, edge.id));
            }
        }

        let vertices: Vec<Vector3> = edges.iter().map(|e| e.v1).collect();
        let plane = Plane::from_vertices(&vertices, fitter)?;
        Ok(Self {
            id,
            group,
            edges: edges.iter().map(|e| e.id).collect(),
            vertices,
            plane,
            basis: plane.basis(),
        })
    }

    /// Copy of this face under a new id
    pub fn with_id(&self, id: FaceId) -> Self {
        Self { id, ..self.clone() }
    }

    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }

    /// Index of the vertex epsilon-equal to `position`
    pub fn find_vertex(&self, position: Vector3) -> Option<usize> {
        self.vertices.iter().position(|v| *v == position)
    }

    /// Replace `old` by a chain of edges with the same overall endpoints.
    ///
    /// Returns false if `old` is not part of this face.
    pub fn splice_edge(&mut self, old: EdgeId, replacement: &[&Edge]) -> bool {
        let Some(index) = self.edges.iter().position(|e| *e == old) else {
            return false;
        };
        self.edges.remove(index);
        self.vertices.remove(index);
        for (offset, edge) in replacement.iter().enumerate() {
            self.edges.insert(index + offset, edge.id);
            self.vertices.insert(index + offset, edge.v1);
        }
        true
    }

    /// Boundary segments as `(start, end)` pairs
    pub fn segments(&self) -> impl Iterator<Item = (Vector3, Vector3)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Smallest distance from `point` to the polygon boundary
    pub fn boundary_distance(&self, point: Vector3) -> f64 {
        self.segments()
            .map(|(a, b)| {
                let ab = b - a;
                let length2 = ab.length_squared();
                let fraction = if length2 > 0.0 {
                    ((point - a).dot(ab) / length2).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                point.distance(a + ab * fraction)
            })
            .fold(f64::INFINITY, f64::min)
    }

    fn project_2d(&self, point: Vector3) -> (f64, f64) {
        (point.dot(self.basis.0), point.dot(self.basis.1))
    }

    /// Even-odd test of the projection of `point` onto the face plane
    pub fn point_is_inside(&self, point: Vector3) -> bool {
        let (x, y) = self.project_2d(point);
        let polygon: Vec<(f64, f64)> = self.vertices.iter().map(|v| self.project_2d(*v)).collect();
        let mut inside = false;
        let mut j = polygon.len() - 1;
        for i in 0..polygon.len() {
            let (xi, yi) = polygon[i];
            let (xj, yj) = polygon[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// An edge or a face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Edge(Edge),
    Face(Face),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Edge(e) => EntityId::Edge(e.id),
            Entity::Face(f) => EntityId::Face(f.id),
        }
    }

    pub fn group(&self) -> GroupId {
        match self {
            Entity::Edge(e) => e.group,
            Entity::Face(f) => f.group,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Entity::Edge(e) => Some(e),
            Entity::Face(_) => None,
        }
    }

    pub fn as_face(&self) -> Option<&Face> {
        match self {
            Entity::Face(f) => Some(f),
            Entity::Edge(_) => None,
        }
    }

    pub fn as_face_mut(&mut self) -> Option<&mut Face> {
        match self {
            Entity::Face(f) => Some(f),
            Entity::Edge(_) => None,
        }
    }
}

impl From<Edge> for Entity {
    fn from(edge: Edge) -> Self {
        Entity::Edge(edge)
    }
}

impl From<Face> for Entity {
    fn from(face: Face) -> Self {
        Entity::Face(face)
    }
}
