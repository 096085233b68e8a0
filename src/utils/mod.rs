//! Utility modules for rust_trajectory_planner

pub mod visualization;

pub use visualization::{colors, PathStyle, Visualizer};
