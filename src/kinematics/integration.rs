//! Multi-step integration with input sensitivities
//!
//! Integrating `N` steps from `x0` with inputs `u_0 .. u_{N-1}` yields the stacked
//! states `X = [x_0; x_1; ...; x_{N-1}]` and `dX/dU` (6N x 2N). Input `u_{N-1}`
//! does not reach any state; it is kept so that every grid point owns an input.
//!
//! Sensitivities follow the chain rule
//!
//! ```text
//! dx_i/du_{i-1} = B_{i-1}
//! dx_i/du_n     = A_{i-1} * dx_{i-1}/du_n      for n < i - 1
//! ```

use nalgebra::DMatrix;

use super::model::{InputVector, StateVector, INPUT_SIZE, STATE_SIZE};
use crate::common::MotionModel;

/// Result of a forward integration
#[derive(Debug, Clone)]
pub struct Integration {
    pub states: Vec<StateVector>,
    /// `dX/dU`, rows grouped per state, columns per input
    pub sensitivity: DMatrix<f64>,
}

impl Integration {
    pub fn num_steps(&self) -> usize {
        self.states.len()
    }

    /// Row of `dX/dU` for component `component` of state `step`
    pub fn sensitivity_row(&self, step: usize, component: usize) -> usize {
        step * STATE_SIZE + component
    }
}

/// Integrate states only
pub fn integrate_states<M>(model: &M, x0: &StateVector, inputs: &[InputVector], h: f64) -> Vec<StateVector>
where
    M: MotionModel<STATE_SIZE, INPUT_SIZE>,
{
    let n = inputs.len().max(1);
    let mut states = Vec::with_capacity(n);
    states.push(*x0);
    for i in 1..n {
        let next = model.step(&states[i - 1], &inputs[i - 1], h);
        states.push(next);
    }
    states
}

/// Integrate states and propagate the sensitivity tensor
pub fn integrate<M>(model: &M, x0: &StateVector, inputs: &[InputVector], h: f64) -> Integration
where
    M: MotionModel<STATE_SIZE, INPUT_SIZE>,
{
    let n = inputs.len().max(1);
    let mut states = Vec::with_capacity(n);
    states.push(*x0);
    let mut sensitivity = DMatrix::<f64>::zeros(STATE_SIZE * n, INPUT_SIZE * n);

    for i in 1..n {
        let x_before = states[i - 1];
        let u_before = &inputs[i - 1];
        let a = model.jacobian_state(&x_before, u_before, h);
        let b = model.jacobian_input(&x_before, u_before, h);
        states.push(model.step(&x_before, u_before, h));

        let row = i * STATE_SIZE;
        let row_before = (i - 1) * STATE_SIZE;
        sensitivity
            .fixed_view_mut::<STATE_SIZE, INPUT_SIZE>(row, (i - 1) * INPUT_SIZE)
            .copy_from(&b);
        for col_step in 0..i - 1 {
            let col = col_step * INPUT_SIZE;
            let propagated = a * sensitivity.fixed_view::<STATE_SIZE, INPUT_SIZE>(row_before, col);
            sensitivity
                .fixed_view_mut::<STATE_SIZE, INPUT_SIZE>(row, col)
                .copy_from(&propagated);
        }
    }

    Integration { states, sensitivity }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::model::{state, SecondOrderKinematicModel, STATE_V, STATE_X};

    fn inputs() -> Vec<InputVector> {
        vec![
            InputVector::new(0.5, 0.01),
            InputVector::new(-1.0, 0.05),
            InputVector::new(0.3, -0.02),
            InputVector::new(0.0, 0.0),
            InputVector::new(1.2, 0.03),
            InputVector::new(-0.4, 0.0),
        ]
    }

    #[test]
    fn test_states_match_step_by_step() {
        let model = SecondOrderKinematicModel::new();
        let x0 = state(1.0, 2.0, 0.3, 4.0, 0.2, 0.01);
        let u = inputs();
        let integration = integrate(&model, &x0, &u, 0.2);
        let states = integrate_states(&model, &x0, &u, 0.2);
        assert_eq!(integration.num_steps(), u.len());
        for (a, b) in integration.states.iter().zip(states.iter()) {
            assert!((a - b).norm() < 1e-14);
        }
        assert!(integration.states[5][STATE_X] > x0[STATE_X]);
    }

    #[test]
    fn test_sensitivity_matches_finite_differences() {
        let model = SecondOrderKinematicModel::new();
        let x0 = state(0.0, 0.0, 0.1, 5.0, 0.5, 0.02);
        let u = inputs();
        let h = 0.25;
        let integration = integrate(&model, &x0, &u, h);
        let eps = 1e-6;

        for step in 0..u.len() {
            for component in 0..INPUT_SIZE {
                let mut up = u.clone();
                let mut um = u.clone();
                up[step][component] += eps;
                um[step][component] -= eps;
                let xp = integrate_states(&model, &x0, &up, h);
                let xm = integrate_states(&model, &x0, &um, h);
                let col = step * INPUT_SIZE + component;
                for i in 0..u.len() {
                    let numeric = (xp[i] - xm[i]) / (2.0 * eps);
                    for s in 0..STATE_SIZE {
                        let analytic = integration.sensitivity[(integration.sensitivity_row(i, s), col)];
                        assert!(
                            (analytic - numeric[s]).abs() < 1e-6 * analytic.abs().max(1.0),
                            "dX[{}][{}]/dU[{}] analytic {} numeric {}",
                            i,
                            s,
                            col,
                            analytic,
                            numeric[s]
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_causality() {
        let model = SecondOrderKinematicModel::new();
        let x0 = state(0.0, 0.0, 0.0, 3.0, 0.0, 0.0);
        let integration = integrate(&model, &x0, &inputs(), 0.1);
        // x_2 cannot depend on u_2 or later
        for col in 2 * INPUT_SIZE..integration.sensitivity.ncols() {
            for s in 0..STATE_SIZE {
                assert_eq!(integration.sensitivity[(integration.sensitivity_row(2, s), col)], 0.0);
            }
        }
        // velocity reacts to the first jerk
        assert!(integration.sensitivity[(integration.sensitivity_row(1, STATE_V), 0)] > 0.0);
    }
}
