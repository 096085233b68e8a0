//! Nonlinear constrained optimization
//!
//! - `qp`: Hildreth's dual method for inequality constrained QPs
//! - `sqp`: SQP with damped BFGS and L1 merit line search
//! - `status`: NLopt-compatible termination statuses

pub mod qp;
pub mod sqp;
pub mod status;

pub use qp::{solve_qp, solve_qp_with_inverse, HildrethConfig, QpSolution};
pub use sqp::{NonlinearProblem, SqpConfig, SqpOutcome, SqpSolver};
pub use status::SolverStatus;
