//! Common types, traits, and error definitions for rust_trajectory_planner
//!
//! This module provides the foundational building blocks shared by the
//! kinematic model, the smoother and the planner.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
