//! Geometry primitives
//!
//! Provides:
//! - [`Vector3`] with epsilon-tolerant equality
//! - Affine subspaces ([`Subspace`], [`Plane`], [`Line`], [`SinglePoint`])
//! - [`GeometryDict`], a dictionary keyed by epsilon-equal geometry

mod dict;
mod subspace;
mod vector;

pub use dict::{GeometryDict, GeometryKey};
pub use subspace::{
    EmptyIntersection, IntersectResult, Line, Plane, SelectionDistance, SinglePoint, Subspace,
};
pub use vector::{Axis, Vector3};
