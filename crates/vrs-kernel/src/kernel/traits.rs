//! Collaborator trait definitions
//!
//! These traits define the services the kernel consumes from its host:
//! best-fit plane computation and display synchronization.

use std::collections::BTreeSet;

use glam::{DVec3, Vec3Swizzles};
use thiserror::Error;

use crate::model::{EdgeId, Entity, EntityId};

/// Error type for collaborator operations
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error("Cannot fit a plane through {0} points")]
    DegeneratePlane(usize),

    #[error("Coordinate list of length {0} is not a list of 3D points")]
    InvalidCoordinates(usize),

    #[error("Plane fit failed: {0}")]
    FitFailed(String),
}

/// Result type for collaborator operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Best-fit plane solver used when building faces
pub trait PlaneFitter: std::fmt::Debug {
    /// Get the name of this solver
    fn name(&self) -> &str;

    /// Fit a plane through a flattened list of points `[x0, y0, z0, x1, ...]`.
    ///
    /// Returns `[nx, ny, nz, d]` with `n · p + d = 0` on the plane.
    fn approx_plane(&self, coords: &[f64]) -> KernelResult<[f64; 4]>;
}

/// Plane fit by Newell's method: the normal is the area vector of the
/// polygon, the plane passes through the centroid.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewellPlaneFit;

impl PlaneFitter for NewellPlaneFit {
    fn name(&self) -> &str {
        "newell"
    }

    fn approx_plane(&self, coords: &[f64]) -> KernelResult<[f64; 4]> {
        if coords.len() % 3 != 0 {
            return Err(KernelError::InvalidCoordinates(coords.len()));
        }
        let points: Vec<DVec3> = coords.chunks_exact(3).map(DVec3::from_slice).collect();
        let count = points.len();
        if count < 3 {
            return Err(KernelError::DegeneratePlane(count));
        }

        let normal: DVec3 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(p, q)| (*p - *q).yzx() * (*p + *q).zxy())
            .sum();
        let centroid = points.iter().sum::<DVec3>() / count as f64;

        let length = normal.length();
        if length < f64::EPSILON {
            return Err(KernelError::DegeneratePlane(count));
        }
        let normal = normal / length;
        Ok([normal.x, normal.y, normal.z, -normal.dot(centroid)])
    }
}

/// Get the default plane solver
pub fn default_plane_fitter() -> Box<dyn PlaneFitter> {
    Box::new(NewellPlaneFit)
}

/// Rendering-side collaborator notified when a step is applied
pub trait DisplayContext {
    /// An entity was added to the model
    fn display(&mut self, entity: &Entity);

    /// An entity was removed from the model
    fn destroy(&mut self, entity: EntityId);

    /// The host's current edge selection, remapped through a step's edge
    /// pairing when the step is applied
    fn selected_edges_mut(&mut self) -> Option<&mut BTreeSet<EdgeId>> {
        None
    }
}

/// A display context that ignores every notification
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplayContext for NullDisplay {
    fn display(&mut self, _entity: &Entity) {}

    fn destroy(&mut self, _entity: EntityId) {}
}

/// A display context that records notifications and holds an edge selection
#[derive(Debug, Default, Clone)]
pub struct DisplayLog {
    /// Entities displayed, in notification order
    pub displayed: Vec<EntityId>,
    /// Entities destroyed, in notification order
    pub destroyed: Vec<EntityId>,
    /// Selected edges
    pub selected_edges: BTreeSet<EdgeId>,
}

impl DisplayLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget recorded notifications (the selection is kept)
    pub fn clear(&mut self) {
        self.displayed.clear();
        self.destroyed.clear();
    }
}

impl DisplayContext for DisplayLog {
    fn display(&mut self, entity: &Entity) {
        self.displayed.push(entity.id());
    }

    fn destroy(&mut self, entity: EntityId) {
        self.destroyed.push(entity);
    }

    fn selected_edges_mut(&mut self) -> Option<&mut BTreeSet<EdgeId>> {
        Some(&mut self.selected_edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_newell_unit_square() {
        let coords = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0];
        let [nx, ny, nz, d] = NewellPlaneFit.approx_plane(&coords).unwrap();
        assert_relative_eq!(nx, 0.0);
        assert_relative_eq!(ny, 0.0);
        assert_relative_eq!(nz, 1.0);
        assert_relative_eq!(d, -1.0);
    }

    #[test]
    fn test_newell_clockwise_flips_normal() {
        let coords = [0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0];
        let [_, _, nz, d] = NewellPlaneFit.approx_plane(&coords).unwrap();
        assert_relative_eq!(nz, -1.0);
        assert_relative_eq!(d, 0.0);
    }

    #[test]
    fn test_newell_degenerate() {
        let collinear = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        assert!(matches!(
            NewellPlaneFit.approx_plane(&collinear),
            Err(KernelError::DegeneratePlane(3))
        ));
        assert!(matches!(
            NewellPlaneFit.approx_plane(&[1.0, 2.0]),
            Err(KernelError::InvalidCoordinates(2))
        ));
        assert!(matches!(
            NewellPlaneFit.approx_plane(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
            Err(KernelError::DegeneratePlane(2))
        ));
    }

    #[test]
    fn test_default_plane_fitter() {
        assert_eq!(default_plane_fitter().name(), "newell");
    }
}
