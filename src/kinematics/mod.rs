//! Vehicle motion model used by the trajectory smoother

pub mod integration;
pub mod model;

pub use integration::{integrate, integrate_states, Integration};
pub use model::{InputVector, SecondOrderKinematicModel, StateVector};
