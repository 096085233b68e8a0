//! Common traits defining interfaces of the planning core

use nalgebra::{SMatrix, SVector};

/// Discrete-time vehicle motion model with analytic derivatives.
///
/// `NX` is the state dimension, `NU` the input dimension. Implementations must keep
/// the Jacobians consistent with [`MotionModel::step`]: gradient based optimizers
/// built on top of them rely on it.
pub trait MotionModel<const NX: usize, const NU: usize> {
    /// Propagate the state by one step of size `h`
    fn step(&self, x: &SVector<f64, NX>, u: &SVector<f64, NU>, h: f64) -> SVector<f64, NX>;

    /// Partial derivatives of the next state with respect to the current state
    fn jacobian_state(
        &self,
        x: &SVector<f64, NX>,
        u: &SVector<f64, NU>,
        h: f64,
    ) -> SMatrix<f64, NX, NX>;

    /// Partial derivatives of the next state with respect to the input
    fn jacobian_input(
        &self,
        x: &SVector<f64, NX>,
        u: &SVector<f64, NU>,
        h: f64,
    ) -> SMatrix<f64, NX, NU>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix1, Vector1};

    // Test that the trait compiles for a trivial integrator
    struct SingleIntegrator;

    impl MotionModel<1, 1> for SingleIntegrator {
        fn step(&self, x: &Vector1<f64>, u: &Vector1<f64>, h: f64) -> Vector1<f64> {
            x + u * h
        }

        fn jacobian_state(&self, _x: &Vector1<f64>, _u: &Vector1<f64>, _h: f64) -> Matrix1<f64> {
            Matrix1::identity()
        }

        fn jacobian_input(&self, _x: &Vector1<f64>, _u: &Vector1<f64>, h: f64) -> Matrix1<f64> {
            Matrix1::new(h)
        }
    }

    #[test]
    fn test_motion_model_trait() {
        let model = SingleIntegrator;
        let next = model.step(&Vector1::new(1.0), &Vector1::new(2.0), 0.5);
        assert!((next[0] - 2.0).abs() < 1e-12);
        assert_eq!(model.jacobian_input(&next, &next, 0.5)[(0, 0)], 0.5);
    }
}
