//! Second-order kinematic vehicle model
//!
//! State `[x, y, theta, v, a, kappa]`, input `[jerk, curvature rate]`.
//! One step is a Heun (trapezoidal) integration of
//!
//! ```text
//! x' = v cos(theta)   y' = v sin(theta)   theta' = v kappa
//! v' = a              a' = j               kappa' = xi
//! ```
//!
//! with exact, closed-form Jacobians of the discrete step.

use nalgebra::{Matrix6, Matrix6x2, Vector2, Vector6};

use crate::common::MotionModel;

pub type StateVector = Vector6<f64>;
pub type InputVector = Vector2<f64>;
pub type StateJacobian = Matrix6<f64>;
pub type InputJacobian = Matrix6x2<f64>;

pub const STATE_X: usize = 0;
pub const STATE_Y: usize = 1;
pub const STATE_THETA: usize = 2;
pub const STATE_V: usize = 3;
pub const STATE_A: usize = 4;
pub const STATE_KAPPA: usize = 5;
pub const STATE_SIZE: usize = 6;

pub const INPUT_J: usize = 0;
pub const INPUT_XI: usize = 1;
pub const INPUT_SIZE: usize = 2;

/// Build a state vector from its named components
pub fn state(x: f64, y: f64, theta: f64, v: f64, a: f64, kappa: f64) -> StateVector {
    Vector6::new(x, y, theta, v, a, kappa)
}

/// Intermediate quantities shared by the step and its derivatives
struct Predictors {
    /// velocity after a full explicit step
    c1: f64,
    /// heading after a full explicit step
    c2: f64,
    /// curvature at the end of the step
    c3: f64,
    /// acceleration at the end of the step
    c4: f64,
}

impl Predictors {
    fn new(x: &StateVector, u: &InputVector, h: f64) -> Self {
        Self {
            c1: x[STATE_V] + h * x[STATE_A],
            c2: x[STATE_THETA] + h * x[STATE_V] * x[STATE_KAPPA],
            c3: x[STATE_KAPPA] + h * u[INPUT_XI],
            c4: x[STATE_A] + h * u[INPUT_J],
        }
    }
}

/// Bicycle-style point model driven by jerk and curvature rate
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondOrderKinematicModel;

impl SecondOrderKinematicModel {
    pub fn new() -> Self {
        Self
    }
}

impl MotionModel<STATE_SIZE, INPUT_SIZE> for SecondOrderKinematicModel {
    fn step(&self, x: &StateVector, u: &InputVector, h: f64) -> StateVector {
        let p = Predictors::new(x, u, h);
        let theta = x[STATE_THETA];
        let v = x[STATE_V];

        Vector6::new(
            x[STATE_X] + 0.5 * h * v * theta.cos() + 0.5 * h * p.c1 * p.c2.cos(),
            x[STATE_Y] + 0.5 * h * v * theta.sin() + 0.5 * h * p.c1 * p.c2.sin(),
            theta + 0.5 * h * v * x[STATE_KAPPA] + 0.5 * h * p.c1 * p.c3,
            v + 0.5 * h * x[STATE_A] + 0.5 * h * p.c4,
            p.c4,
            p.c3,
        )
    }

    fn jacobian_state(&self, x: &StateVector, u: &InputVector, h: f64) -> StateJacobian {
        let p = Predictors::new(x, u, h);
        let theta = x[STATE_THETA];
        let v = x[STATE_V];
        let kappa = x[STATE_KAPPA];
        let (sin_th, cos_th) = theta.sin_cos();
        let (sin_c2, cos_c2) = p.c2.sin_cos();
        let hh = 0.5 * h;
        let hh2 = 0.5 * h * h;

        let dx_dth = -hh * v * sin_th - hh * p.c1 * sin_c2;
        let dx_dv = hh * cos_th + hh * cos_c2 - hh2 * kappa * p.c1 * sin_c2;
        let dx_da = hh2 * cos_c2;
        let dx_dk = -hh2 * v * p.c1 * sin_c2;

        let dy_dth = hh * v * cos_th + hh * p.c1 * cos_c2;
        let dy_dv = hh * sin_th + hh * sin_c2 + hh2 * kappa * p.c1 * cos_c2;
        let dy_da = hh2 * sin_c2;
        let dy_dk = hh2 * v * p.c1 * cos_c2;

        let dth_dv = hh * kappa + hh * p.c3;
        let dth_da = hh2 * p.c3;
        let dth_dk = hh * v + hh * p.c1;

        #[rustfmt::skip]
        let jac = Matrix6::new(
            1.0, 0.0, dx_dth, dx_dv, dx_da, dx_dk,
            0.0, 1.0, dy_dth, dy_dv, dy_da, dy_dk,
            0.0, 0.0, 1.0, dth_dv, dth_da, dth_dk,
            0.0, 0.0, 0.0, 1.0, h, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        );
        jac
    }

    fn jacobian_input(&self, x: &StateVector, u: &InputVector, h: f64) -> InputJacobian {
        let p = Predictors::new(x, u, h);
        let hh2 = 0.5 * h * h;

        #[rustfmt::skip]
        let jac = Matrix6x2::new(
            0.0, 0.0,
            0.0, 0.0,
            0.0, hh2 * p.c1,
            hh2, 0.0,
            h, 0.0,
            0.0, h,
        );
        jac
    }
}
