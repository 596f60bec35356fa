//! Global constants for vrs-kernel

/// Tolerance used by every epsilon-equality test in the kernel
pub const EPSILON: f64 = 1e-5;

/// Selection radius for vertices (model units, before control scaling)
pub const DISTANCE_VERTEX_MIN: f64 = 0.05;

/// Selection radius for edges (model units, before control scaling)
pub const DISTANCE_EDGE_MIN: f64 = 0.044;

/// Selection radius for faces (model units, before control scaling)
pub const DISTANCE_FACE_MIN: f64 = 0.04;

/// Selection threshold of a whole-space guide
pub const GUIDE_WHOLE_SPACE_THRESHOLD: f64 = 1.0;

/// Selection threshold of a plane guide
pub const GUIDE_PLANE_THRESHOLD: f64 = 0.04;

/// Selection threshold of a line guide
pub const GUIDE_LINE_THRESHOLD: f64 = 0.044;

/// Selection threshold of a point guide
pub const GUIDE_POINT_THRESHOLD: f64 = 0.05;

/// Factor applied to the best distance found so far during nearest-feature searches
pub const MARGINAL_INCREASE: f64 = 1.01;
