//! rust_trajectory_planner - trajectory planning core for automated vehicles
//!
//! A coarse horizon is planned by a discrete engine behind the
//! [`planner::DiscreteEngine`] trait and refined by a nonlinear trajectory smoother.
//! [`planner::MiqpPlanner`] runs the planning cycle around both.

// Core modules
pub mod common;
pub mod geometry;
pub mod utils;

// Planning modules
pub mod kinematics;
pub mod optimization;
pub mod smoothing;
pub mod obstacles;
pub mod planner;

// Re-export common types for convenience
pub use common::{DiscretizedTrajectory, PathPoint, Point2D, TrajectoryPoint};
pub use common::{ErrorKind, PlanningError, PlanningResult};
pub use planner::{MiqpPlanner, PlannerConfig, PlanningOutput, PlanningRequest};
