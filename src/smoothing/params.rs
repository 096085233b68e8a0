//! Weights, bounds and solver settings of the smoothing problem

use serde::{Deserialize, Serialize};

use crate::optimization::SqpConfig;

/// Cost weights and bounds of the smoothing problem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemParameters {
    // deviation from the coarse trajectory
    pub cost_offset_x: f64,
    pub cost_offset_y: f64,
    pub cost_offset_theta: f64,
    pub cost_offset_v: f64,
    // absolute values
    pub cost_curvature: f64,
    pub cost_acceleration: f64,
    // inputs
    pub cost_curvature_change: f64,
    pub cost_jerk: f64,
    /// Smoothing of `|j|` as `sqrt(j^2 + eps)`
    pub jerk_smoothing_epsilon: f64,

    pub lower_bound_acceleration: f64,
    pub upper_bound_acceleration: f64,
    pub tol_acceleration: f64,
    pub lower_bound_curvature: f64,
    pub upper_bound_curvature: f64,
    pub tol_curvature: f64,
    pub lower_bound_velocity: f64,
    pub upper_bound_velocity: f64,
    pub tol_velocity: f64,
    pub lower_bound_jerk: f64,
    pub upper_bound_jerk: f64,
    pub tol_jerk: f64,
    pub lower_bound_curvature_change: f64,
    pub upper_bound_curvature_change: f64,
    pub tol_curvature_change: f64,
}

impl Default for ProblemParameters {
    fn default() -> Self {
        Self {
            cost_offset_x: 1e1,
            cost_offset_y: 1e1,
            cost_offset_theta: 0.0,
            cost_offset_v: 1e1,
            cost_curvature: 1e2,
            cost_acceleration: 0.0,
            cost_curvature_change: 2e1,
            cost_jerk: 2e0,
            jerk_smoothing_epsilon: 1e-3,
            lower_bound_acceleration: -8.0,
            upper_bound_acceleration: 4.0,
            tol_acceleration: 1e-2,
            lower_bound_curvature: -0.2,
            upper_bound_curvature: 0.2,
            tol_curvature: 1e-2,
            lower_bound_velocity: 0.0,
            upper_bound_velocity: 15.0,
            tol_velocity: 1e-2,
            lower_bound_jerk: -5.0,
            upper_bound_jerk: 5.0,
            tol_jerk: 1e-2,
            lower_bound_curvature_change: -5.0,
            upper_bound_curvature_change: 5.0,
            tol_curvature_change: 1e-2,
        }
    }
}

impl ProblemParameters {
    pub fn bounded_jerk(&self, j: f64) -> f64 {
        bound_value(j, self.upper_bound_jerk, self.lower_bound_jerk, self.tol_jerk)
    }

    pub fn is_jerk_within_bounds(&self, j: f64) -> bool {
        within(j, self.lower_bound_jerk, self.upper_bound_jerk, self.tol_jerk)
    }

    pub fn bounded_curvature_change(&self, xi: f64) -> f64 {
        bound_value(
            xi,
            self.upper_bound_curvature_change,
            self.lower_bound_curvature_change,
            self.tol_curvature_change,
        )
    }

    pub fn is_curvature_change_within_bounds(&self, xi: f64) -> bool {
        within(
            xi,
            self.lower_bound_curvature_change,
            self.upper_bound_curvature_change,
            self.tol_curvature_change,
        )
    }

    pub fn bounded_acceleration(&self, a: f64) -> f64 {
        bound_value(
            a,
            self.upper_bound_acceleration,
            self.lower_bound_acceleration,
            self.tol_acceleration,
        )
    }

    pub fn is_acceleration_within_bounds(&self, a: f64) -> bool {
        within(
            a,
            self.lower_bound_acceleration,
            self.upper_bound_acceleration,
            self.tol_acceleration,
        )
    }

    pub fn bounded_curvature(&self, kappa: f64) -> f64 {
        bound_value(
            kappa,
            self.upper_bound_curvature,
            self.lower_bound_curvature,
            self.tol_curvature,
        )
    }

    pub fn is_curvature_within_bounds(&self, kappa: f64) -> bool {
        within(
            kappa,
            self.lower_bound_curvature,
            self.upper_bound_curvature,
            self.tol_curvature,
        )
    }

    pub fn bounded_velocity(&self, v: f64) -> f64 {
        bound_value(v, self.upper_bound_velocity, self.lower_bound_velocity, self.tol_velocity)
    }

    pub fn is_velocity_within_bounds(&self, v: f64) -> bool {
        within(v, self.lower_bound_velocity, self.upper_bound_velocity, self.tol_velocity)
    }
}

/// Settings of the SQP run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    pub x_tol_rel: f64,
    pub x_tol_abs: f64,
    pub ineq_const_tol: f64,
    /// Accepted mismatch between the first smoothed state and the initial point
    pub eq_const_tol: f64,
    /// `0` disables the criterion
    pub f_tol_rel: f64,
    pub stop_value: f64,
    pub max_num_evals: usize,
    /// Wall-clock budget [s]
    pub max_time: f64,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            x_tol_rel: 1e-6,
            x_tol_abs: 1e-6,
            ineq_const_tol: 1e-4,
            eq_const_tol: 1e-4,
            f_tol_rel: 0.0,
            stop_value: f64::NEG_INFINITY,
            max_num_evals: 1000,
            max_time: 0.15,
        }
    }
}

impl From<&SolverParameters> for SqpConfig {
    fn from(params: &SolverParameters) -> Self {
        SqpConfig {
            x_tol_rel: params.x_tol_rel,
            x_tol_abs: params.x_tol_abs,
            f_tol_rel: params.f_tol_rel,
            stop_value: params.stop_value,
            max_evaluations: params.max_num_evals,
            max_time: params.max_time,
            constraint_tol: params.ineq_const_tol,
            ..SqpConfig::default()
        }
    }
}

fn within(value: f64, lower: f64, upper: f64, tol: f64) -> bool {
    value >= lower - tol && value <= upper + tol
}

/// Pull `v` back inside `[vmin, vmax]`, landing `tol` inside the violated bound
pub fn bound_value(v: f64, vmax: f64, vmin: f64, tol: f64) -> f64 {
    if v > vmax {
        vmax - tol
    } else if v < vmin {
        vmin + tol
    } else {
        v
    }
}

/// Linear interpolation between `(idx0, v0)` and `(idx1, v1)` evaluated at `idx`
pub fn interpolate_within_bounds(idx0: usize, v0: f64, idx1: usize, v1: f64, idx: usize) -> f64 {
    if idx1 == idx0 {
        return v0;
    }
    let ratio = (idx as f64 - idx0 as f64) / (idx1 as f64 - idx0 as f64);
    v0 + ratio * (v1 - v0)
}

/// Round `a` to `precision` decimal places
pub fn round_to(a: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (a * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_value() {
        assert_eq!(bound_value(0.5, 1.0, -1.0, 0.1), 0.5);
        assert!((bound_value(3.0, 1.0, -1.0, 0.1) - 0.9).abs() < 1e-12);
        assert!((bound_value(-3.0, 1.0, -1.0, 0.1) + 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_use_tolerance() {
        let params = ProblemParameters::default();
        assert!(params.is_jerk_within_bounds(5.005));
        assert!(!params.is_jerk_within_bounds(5.02));
        assert!(params.is_velocity_within_bounds(-0.005));
        assert!(!params.is_curvature_within_bounds(0.25));
        assert!((params.bounded_acceleration(10.0) - 3.99).abs() < 1e-12);
        assert!((params.bounded_curvature_change(-7.0) + 4.99).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_within_bounds() {
        assert!((interpolate_within_bounds(0, 1.0, 4, 3.0, 1) - 1.5).abs() < 1e-12);
        assert_eq!(interpolate_within_bounds(2, 1.0, 2, 3.0, 2), 1.0);
    }

    #[test]
    fn test_round_to() {
        assert!((round_to(1.234_56, 4) - 1.2346).abs() < 1e-12);
        assert!((round_to(0.249_999_999, 4) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let params: ProblemParameters = toml::from_str("cost_jerk = 5.0").unwrap();
        assert_eq!(params.cost_jerk, 5.0);
        assert_eq!(params.upper_bound_velocity, 15.0);
        let solver: SolverParameters = toml::from_str("max_time = 1.0").unwrap();
        assert_eq!(solver.max_num_evals, 1000);
        assert_eq!(solver.max_time, 1.0);
    }
}
