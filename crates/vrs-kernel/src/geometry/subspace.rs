//! Affine subspaces
//!
//! Points, lines, planes and the whole space, closed under intersection.
//! They serve both as the kernel's coplanarity tests and as snapping
//! constraints for interactive tools.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dict::GeometryKey;
use super::vector::Vector3;
use crate::constants::{
    EPSILON, GUIDE_LINE_THRESHOLD, GUIDE_PLANE_THRESHOLD, GUIDE_POINT_THRESHOLD,
    GUIDE_WHOLE_SPACE_THRESHOLD,
};
use crate::kernel::{KernelError, KernelResult, PlaneFitter};

/// Two subspaces do not meet.
///
/// This is an expected outcome, not a fault: callers fall back to a wider
/// subspace or reject the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("affine subspaces do not intersect")]
pub struct EmptyIntersection;

/// Result of intersecting two subspaces
pub type IntersectResult = Result<Subspace, EmptyIntersection>;

/// Ranking of a candidate subspace for selection.
///
/// Ordering is lexicographic: lower dimension first, then smaller distance.
/// A distance above 1.0 means the candidate is out of reach.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SelectionDistance {
    /// 0 = point, 1 = line, 2 = plane, 3 = whole space
    pub dimension: u8,
    /// Distance divided by the scaled threshold of the subspace kind
    pub distance: f64,
}

impl SelectionDistance {
    /// Starting value of a search: beaten by anything of dimension < 3
    pub const UNSELECTED: Self = Self {
        dimension: 3,
        distance: 0.0,
    };

    pub fn new(dimension: u8, distance: f64) -> Self {
        Self {
            dimension,
            distance,
        }
    }

    /// Whether the candidate is within its selection threshold
    pub fn is_selectable(&self) -> bool {
        self.distance <= 1.0
    }
}

/// A plane: `normal · p + distance = 0`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal
    pub normal: Vector3,
    /// Signed distance from the origin
    pub distance: f64,
}

impl Plane {
    /// Create a plane from a unit normal and signed distance
    pub fn new(normal: Vector3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Plane through `point` with the given unit normal
    pub fn from_point_and_normal(point: Vector3, normal: Vector3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Best-fit plane through `vertices`, computed by the plane-fit collaborator
    pub fn from_vertices(vertices: &[Vector3], fitter: &dyn PlaneFitter) -> KernelResult<Self> {
        let coords: Vec<f64> = vertices.iter().flat_map(|v| v.to_array()).collect();
        let [nx, ny, nz, d] = fitter.approx_plane(&coords)?;
        let normal = Vector3::new(nx, ny, nz);
        let length = normal.length();
        if length < EPSILON {
            return Err(KernelError::DegeneratePlane(vertices.len()));
        }
        Ok(Self::new(normal / length, d / length))
    }

    /// Signed distance of `point` (positive on the normal side)
    pub fn signed_distance(&self, point: Vector3) -> f64 {
        self.normal.dot(point) + self.distance
    }

    pub fn distance_to_point(&self, point: Vector3) -> f64 {
        self.signed_distance(point).abs()
    }

    pub fn project_point_inside(&self, point: Vector3) -> Vector3 {
        point - self.normal * self.signed_distance(point)
    }

    pub fn contains_point(&self, point: Vector3) -> bool {
        self.distance_to_point(point) < EPSILON
    }

    /// The point of the plane closest to the origin
    pub fn point_on_plane(&self) -> Vector3 {
        self.normal * -self.distance
    }

    /// Orthonormal in-plane basis `(u, v)` with `u × v = normal`
    pub fn basis(&self) -> (Vector3, Vector3) {
        let helper = if self.normal.x().abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        let u = helper.project_orthogonal(self.normal).normalized();
        let v = self.normal.cross(u);
        (u, v)
    }

    pub fn shifted(&self, delta: Vector3) -> Self {
        Self::new(self.normal, self.distance - self.normal.dot(delta))
    }

    /// Intersection with another plane: the same plane, a line, or nothing
    pub fn intersect_plane(&self, other: &Plane) -> IntersectResult {
        let cross = self.normal.cross(other.normal);
        let length = cross.length();
        if length < EPSILON {
            return if other.contains_point(self.point_on_plane()) {
                Ok(Subspace::Plane(*self))
            } else {
                Err(EmptyIntersection)
            };
        }
        let axis = cross / length;
        let origin = self.point_on_plane();
        let across = self.normal.cross(axis);
        let s0 = other.signed_distance(origin);
        let s1 = other.signed_distance(origin + across);
        let point = origin + across * (s0 / (s0 - s1));
        Ok(Subspace::Line(Line::new(point, axis)))
    }
}

impl PartialEq for Plane {
    /// Oriented comparison: the flipped plane `(-normal, -distance)` is a different key
    fn eq(&self, other: &Self) -> bool {
        self.normal == other.normal && (self.distance - other.distance).abs() < EPSILON
    }
}

impl GeometryKey for Plane {
    fn hash_seed(&self) -> f64 {
        let n = self.normal;
        (n.x() + n.y() * 1.1 + n.z() * 1.2 + self.distance * 1.3) * (0.25 / EPSILON)
    }
}

/// An infinite line
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Line {
    /// A point on the line
    pub position: Vector3,
    /// Unit direction
    pub axis: Vector3,
}

impl Line {
    /// Create a line; `axis` is normalized
    pub fn new(position: Vector3, axis: Vector3) -> Self {
        Self {
            position,
            axis: axis.normalized(),
        }
    }

    pub fn project_point_inside(&self, point: Vector3) -> Vector3 {
        self.position + self.axis * (point - self.position).dot(self.axis)
    }

    pub fn distance_to_point(&self, point: Vector3) -> f64 {
        (point - self.position).project_orthogonal(self.axis).length()
    }

    pub fn contains_point(&self, point: Vector3) -> bool {
        self.distance_to_point(point) < EPSILON
    }

    pub fn shifted(&self, delta: Vector3) -> Self {
        Self {
            position: self.position + delta,
            axis: self.axis,
        }
    }

    /// Intersection with a plane: this line, a point, or nothing
    pub fn intersect_plane(&self, plane: &Plane) -> IntersectResult {
        let s0 = plane.signed_distance(self.position);
        let s1 = plane.signed_distance(self.position + self.axis);
        if (s1 - s0).abs() < EPSILON {
            return if s0.abs() < EPSILON {
                Ok(Subspace::Line(*self))
            } else {
                Err(EmptyIntersection)
            };
        }
        let point = self.position + self.axis * (s0 / (s0 - s1));
        if !plane.contains_point(point) {
            return Err(EmptyIntersection);
        }
        Ok(Subspace::SinglePoint(SinglePoint::new(point)))
    }

    /// Intersection with another line: this line, a point, or nothing
    pub fn intersect_line(&self, other: &Line) -> IntersectResult {
        let normal = self.axis.cross(other.axis);
        if normal.length() < EPSILON {
            return if other.contains_point(self.position) {
                Ok(Subspace::Line(*self))
            } else {
                Err(EmptyIntersection)
            };
        }
        // Offset from `other`, measured inside the plane spanned by both axes
        let across = other.axis.cross(normal).normalized();
        let offset = |p: Vector3| (p - other.position).dot(across);
        let s0 = offset(self.position);
        let s1 = offset(self.position + self.axis);
        if (s1 - s0).abs() < EPSILON {
            return Err(EmptyIntersection);
        }
        let point = self.position + self.axis * (s0 / (s0 - s1));
        if !other.contains_point(point) {
            return Err(EmptyIntersection);
        }
        Ok(Subspace::SinglePoint(SinglePoint::new(point)))
    }
}

/// A single position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SinglePoint {
    pub position: Vector3,
}

impl SinglePoint {
    pub fn new(position: Vector3) -> Self {
        Self { position }
    }
}

/// An affine subspace of model space
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Subspace {
    /// Unconstrained
    WholeSpace,
    Plane(Plane),
    Line(Line),
    SinglePoint(SinglePoint),
}

impl Subspace {
    /// 3 for the whole space down to 0 for a point
    pub fn dimension(&self) -> u8 {
        match self {
            Subspace::WholeSpace => 3,
            Subspace::Plane(_) => 2,
            Subspace::Line(_) => 1,
            Subspace::SinglePoint(_) => 0,
        }
    }

    /// Closest point of the subspace
    pub fn project_point_inside(&self, point: Vector3) -> Vector3 {
        match self {
            Subspace::WholeSpace => point,
            Subspace::Plane(plane) => plane.project_point_inside(point),
            Subspace::Line(line) => line.project_point_inside(point),
            Subspace::SinglePoint(sp) => sp.position,
        }
    }

    pub fn distance_to_point(&self, point: Vector3) -> f64 {
        match self {
            Subspace::WholeSpace => 0.0,
            Subspace::Plane(plane) => plane.distance_to_point(point),
            Subspace::Line(line) => line.distance_to_point(point),
            Subspace::SinglePoint(sp) => sp.position.distance(point),
        }
    }

    pub fn contains_point(&self, point: Vector3) -> bool {
        self.distance_to_point(point) < EPSILON
    }

    /// Pure translation by `delta`
    pub fn shifted(&self, delta: Vector3) -> Self {
        match self {
            Subspace::WholeSpace => Subspace::WholeSpace,
            Subspace::Plane(plane) => Subspace::Plane(plane.shifted(delta)),
            Subspace::Line(line) => Subspace::Line(line.shifted(delta)),
            Subspace::SinglePoint(sp) => Subspace::SinglePoint(SinglePoint::new(sp.position + delta)),
        }
    }

    /// Intersection of two subspaces
    pub fn intersect(&self, other: &Subspace) -> IntersectResult {
        match (self, other) {
            (Subspace::WholeSpace, _) => Ok(*other),
            (_, Subspace::WholeSpace) => Ok(*self),
            (Subspace::SinglePoint(a), Subspace::SinglePoint(b)) => {
                if a.position == b.position {
                    Ok(*self)
                } else {
                    Err(EmptyIntersection)
                }
            }
            (_, Subspace::SinglePoint(sp)) => {
                if self.contains_point(sp.position) {
                    Ok(*other)
                } else {
                    Err(EmptyIntersection)
                }
            }
            (Subspace::SinglePoint(sp), _) => {
                if other.contains_point(sp.position) {
                    Ok(*self)
                } else {
                    Err(EmptyIntersection)
                }
            }
            (Subspace::Plane(a), Subspace::Plane(b)) => a.intersect_plane(b),
            (Subspace::Plane(plane), Subspace::Line(line))
            | (Subspace::Line(line), Subspace::Plane(plane)) => line.intersect_plane(plane),
            (Subspace::Line(a), Subspace::Line(b)) => a.intersect_line(b),
        }
    }

    /// Selection threshold of this kind of subspace, in model units
    pub fn selection_threshold(&self) -> f64 {
        match self {
            Subspace::WholeSpace => GUIDE_WHOLE_SPACE_THRESHOLD,
            Subspace::Plane(_) => GUIDE_PLANE_THRESHOLD,
            Subspace::Line(_) => GUIDE_LINE_THRESHOLD,
            Subspace::SinglePoint(_) => GUIDE_POINT_THRESHOLD,
        }
    }

    /// Rank this subspace as a selection candidate for `point`.
    ///
    /// `scale` converts model distances to the controller's world scale.
    pub fn selection_distance(&self, scale: impl Fn(f64) -> f64, point: Vector3) -> SelectionDistance {
        let threshold = scale(self.selection_threshold());
        SelectionDistance::new(self.dimension(), self.distance_to_point(point) / threshold)
    }
}

impl PartialEq for Subspace {
    /// Geometric comparison: both sides describe the same set of points
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Subspace::WholeSpace, Subspace::WholeSpace) => true,
            (Subspace::Plane(a), Subspace::Plane(b)) => {
                a.normal.cross(b.normal).length() < EPSILON && b.contains_point(a.point_on_plane())
            }
            (Subspace::Line(a), Subspace::Line(b)) => {
                a.axis.cross(b.axis).length() < EPSILON && b.contains_point(a.position)
            }
            (Subspace::SinglePoint(a), Subspace::SinglePoint(b)) => a.position == b.position,
            _ => false,
        }
    }
}

impl From<Plane> for Subspace {
    fn from(plane: Plane) -> Self {
        Subspace::Plane(plane)
    }
}

impl From<Line> for Subspace {
    fn from(line: Line) -> Self {
        Subspace::Line(line)
    }
}

impl From<SinglePoint> for Subspace {
    fn from(sp: SinglePoint) -> Self {
        Subspace::SinglePoint(sp)
    }
}
