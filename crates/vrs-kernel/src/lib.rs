//! Edge/Face Modeling Kernel for VR Sketching
//!
//! This crate provides:
//! - Geometry primitives: epsilon-tolerant vectors, affine subspaces and a
//!   dictionary keyed by approximate geometry
//! - The model: a tree of groups holding edges and the planar faces they bound
//! - Model steps: staged edits consolidated into a valid topology (crossing
//!   edges split, faces split along new edges) and applied transactionally
//! - Undo/redo history with preview steps
//! - Selection and snapping helpers for interactive tools

pub mod config;
pub mod constants;
pub mod face_reduction;
pub mod geometry;
pub mod history;
pub mod kernel;
pub mod model;
pub mod selection;
pub mod step;

// Re-exports for convenience
pub use config::{ConfigError, KernelConfig, SelectionConfig};
pub use constants::EPSILON;
pub use face_reduction::{all_potential_planes, potential_new_face};
pub use geometry::{
    Axis, EmptyIntersection, GeometryDict, GeometryKey, IntersectResult, Line, Plane,
    SelectionDistance, SinglePoint, Subspace, Vector3,
};
pub use history::StepHistory;
pub use kernel::{
    DisplayContext, DisplayLog, KernelError, KernelResult, NewellPlaneFit, NullDisplay,
    PlaneFitter, default_plane_fitter,
};
pub use model::{
    Edge, EdgeId, Entity, EntityId, Face, FaceId, Group, GroupId, Model, ModelError, ModelResult,
};
pub use selection::{FindOptions, Guide, Selection, find_closest};
pub use step::{GroupMove, ModelStep, StepState};
