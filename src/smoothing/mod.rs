//! Trajectory smoothing post-processor
//!
//! Refines the coarse engine trajectory into one with bounded jerk, curvature rate,
//! acceleration and velocity that still tracks the coarse points.

pub mod params;
pub mod trajectory_smoother;

pub use params::{bound_value, interpolate_within_bounds, round_to, ProblemParameters, SolverParameters};
pub use trajectory_smoother::{smooth_trajectory, InitOutcome, TrajectorySmoother, ValidationReport};

/// Smoother statuses share the solver's NLopt-style codes
pub type SmootherStatus = crate::optimization::SolverStatus;
