//! Kernel collaborators
//!
//! Services the model relies on but does not implement itself: plane fitting
//! and display synchronization. Each trait comes with a default
//! implementation usable without a host application.

mod traits;

pub use traits::{
    DisplayContext, DisplayLog, KernelError, KernelResult, NewellPlaneFit, NullDisplay,
    PlaneFitter, default_plane_fitter,
};
