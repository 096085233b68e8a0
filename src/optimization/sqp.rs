//! Sequential quadratic programming for bound and inequality constrained problems
//!
//! Each iteration solves the local QP
//!
//! ```text
//! min  1/2 d' B d + g' d
//! s.t. J d <= -c
//!      lb - x <= d <= ub - x
//! ```
//!
//! where `B` is a damped BFGS approximation of the Lagrangian Hessian, then
//! backtracks on the L1 merit function `f + rho * sum(max(0, c))`.
//!
//! `B` and its inverse are updated together, so the QP never factorizes. The
//! time budget is checked before every evaluation and every QP; a QP may use at
//! most half of the time left.

use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use super::qp::{solve_qp_with_inverse, HildrethConfig};
use super::status::SolverStatus;

/// Constrained minimization problem `min f(x)  s.t.  c(x) <= 0, lb <= x <= ub`
pub trait NonlinearProblem {
    fn dimension(&self) -> usize;

    fn lower_bounds(&self) -> DVector<f64>;

    fn upper_bounds(&self) -> DVector<f64>;

    fn num_inequality_constraints(&self) -> usize;

    /// Objective value, writing the gradient when requested
    fn objective(&mut self, x: &DVector<f64>, grad: Option<&mut DVector<f64>>) -> f64;

    /// Constraint values `c(x)` (feasible when `<= 0`), writing the Jacobian when requested
    fn inequality_constraints(
        &mut self,
        x: &DVector<f64>,
        result: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    );
}

/// Termination criteria, mirroring the usual NLopt stopping set
#[derive(Debug, Clone)]
pub struct SqpConfig {
    pub x_tol_rel: f64,
    pub x_tol_abs: f64,
    /// Relative objective change; `0` disables the criterion
    pub f_tol_rel: f64,
    /// Stop once the objective drops to this value
    pub stop_value: f64,
    /// Maximum objective/constraint evaluations; `0` means unlimited
    pub max_evaluations: usize,
    /// Wall-clock budget [s]; non-positive means unlimited
    pub max_time: f64,
    /// Constraint violation accepted as feasible
    pub constraint_tol: f64,
    pub qp: HildrethConfig,
}

impl Default for SqpConfig {
    fn default() -> Self {
        Self {
            x_tol_rel: 1e-6,
            x_tol_abs: 1e-6,
            f_tol_rel: 0.0,
            stop_value: f64::NEG_INFINITY,
            max_evaluations: 1000,
            max_time: 0.0,
            constraint_tol: 1e-4,
            qp: HildrethConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqpOutcome {
    pub status: SolverStatus,
    pub x: DVector<f64>,
    pub f: f64,
    /// Largest constraint value at `x` (non-positive when feasible)
    pub max_violation: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

/// Values of one evaluation of the problem functions
struct Evaluation {
    f: f64,
    grad: DVector<f64>,
    c: DVector<f64>,
    jac: DMatrix<f64>,
}

impl Evaluation {
    fn is_finite(&self) -> bool {
        self.f.is_finite()
            && self.grad.iter().all(|v| v.is_finite())
            && self.c.iter().all(|v| v.is_finite())
            && self.jac.iter().all(|v| v.is_finite())
    }

    fn violation(&self) -> f64 {
        self.c.iter().map(|c| c.max(0.0)).sum()
    }

    fn max_violation(&self) -> f64 {
        self.c.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    fn merit(&self, rho: f64) -> f64 {
        self.f + rho * self.violation()
    }

    fn lagrangian_gradient(&self, multipliers: &DVector<f64>) -> DVector<f64> {
        if self.c.is_empty() {
            return self.grad.clone();
        }
        &self.grad + self.jac.transpose() * multipliers
    }
}

/// Counts evaluations and enforces the evaluation and time budgets
struct Budget {
    start: Instant,
    max_time: Option<Duration>,
    max_evaluations: Option<usize>,
    evaluations: usize,
}

impl Budget {
    fn new(config: &SqpConfig) -> Self {
        Self {
            start: Instant::now(),
            max_time: (config.max_time > 0.0).then(|| Duration::from_secs_f64(config.max_time)),
            max_evaluations: (config.max_evaluations > 0).then_some(config.max_evaluations),
            evaluations: 0,
        }
    }

    /// Deadline for one QP: half of the time left, the rest stays with the line search
    fn qp_deadline(&self) -> Option<Instant> {
        let limit = self.max_time?;
        let remaining = limit.saturating_sub(self.start.elapsed());
        Some(Instant::now() + remaining / 2)
    }

    /// Status that forbids further work, if any
    fn exhausted(&self) -> Option<SolverStatus> {
        if let Some(limit) = self.max_time {
            if self.start.elapsed() >= limit {
                return Some(SolverStatus::MaxtimeReached);
            }
        }
        if let Some(limit) = self.max_evaluations {
            if self.evaluations >= limit {
                return Some(SolverStatus::MaxevalReached);
            }
        }
        None
    }

    fn evaluate<P: NonlinearProblem>(&mut self, problem: &mut P, x: &DVector<f64>) -> Evaluation {
        self.evaluations += 1;
        let n = x.len();
        let m = problem.num_inequality_constraints();
        let mut grad = DVector::zeros(n);
        let f = problem.objective(x, Some(&mut grad));
        let mut c = DVector::zeros(m);
        let mut jac = DMatrix::zeros(m, n);
        if m > 0 {
            problem.inequality_constraints(x, &mut c, Some(&mut jac));
        }
        Evaluation { f, grad, c, jac }
    }
}

/// SQP solver with damped BFGS updates
pub struct SqpSolver {
    config: SqpConfig,
}

impl SqpSolver {
    pub fn new(config: SqpConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SqpConfig::default())
    }

    pub fn config(&self) -> &SqpConfig {
        &self.config
    }

    /// Minimize `problem` starting from `x0`
    ///
    /// # Arguments
    /// * `problem` - Problem functions and bounds
    /// * `x0` - Initial guess; clamped into the bounds before the first evaluation
    ///
    /// # Returns
    /// Outcome with the best iterate found and the termination status
    pub fn minimize<P: NonlinearProblem>(&self, problem: &mut P, x0: &DVector<f64>) -> SqpOutcome {
        let n = problem.dimension();
        let lb = problem.lower_bounds();
        let ub = problem.upper_bounds();
        if x0.len() != n || lb.len() != n || ub.len() != n || lb.iter().zip(ub.iter()).any(|(l, u)| l > u) {
            return SqpOutcome {
                status: SolverStatus::InvalidArgs,
                x: x0.clone(),
                f: f64::NAN,
                max_violation: f64::NAN,
                evaluations: 0,
                iterations: 0,
            };
        }

        let mut budget = Budget::new(&self.config);
        let mut x = clamp(x0, &lb, &ub);
        let mut current = budget.evaluate(problem, &x);
        if !current.is_finite() {
            return outcome(SolverStatus::Failure, x, &current, &budget, 0);
        }

        let m = current.c.len();
        let mut hessian = DMatrix::<f64>::identity(n, n);
        let mut hessian_inv = DMatrix::<f64>::identity(n, n);
        let mut rho: f64 = 1.0;
        let mut iterations = 0;

        let status = loop {
            if current.f <= self.config.stop_value {
                break SolverStatus::StopvalReached;
            }
            if let Some(status) = budget.exhausted() {
                break status;
            }
            iterations += 1;

            let (a, b) = local_constraints(&current, &x, &lb, &ub);
            let qp_config = HildrethConfig {
                deadline: budget.qp_deadline(),
                ..self.config.qp
            };
            let qp = solve_qp_with_inverse(&hessian_inv, &current.grad, &a, &b, &qp_config);
            if qp.d.iter().any(|v| !v.is_finite()) {
                break SolverStatus::RoundoffLimited;
            }
            if !qp.converged {
                trace!(iteration = iterations, sweeps = qp.iterations, "qp stopped early");
            }
            let direction = clamp(&(&x + &qp.d), &lb, &ub) - &x;

            let feasible = current.max_violation() <= self.config.constraint_tol;
            if feasible && self.is_small_step(&direction, &x) {
                break SolverStatus::XtolReached;
            }

            let multipliers = qp.multipliers.rows(0, m).into_owned();
            let largest_multiplier = multipliers.iter().copied().fold(0.0, f64::max);
            rho = rho.max(1.5 * largest_multiplier + 1e-3);

            // backtracking on the L1 merit function
            let merit = current.merit(rho);
            let slope = current.grad.dot(&direction) - rho * current.violation();
            let mut alpha: f64 = 1.0;
            let accepted = loop {
                if let Some(status) = budget.exhausted() {
                    break Err(status);
                }
                let trial_x = &x + &direction * alpha;
                let trial = budget.evaluate(problem, &trial_x);
                if trial.is_finite() && trial.merit(rho) <= merit + 1e-4 * alpha * slope.min(0.0) {
                    break Ok((trial_x, trial));
                }
                alpha *= 0.5;
                if alpha < 1e-10 {
                    break Err(SolverStatus::RoundoffLimited);
                }
            };
            let (next_x, next) = match accepted {
                Ok(accepted) => accepted,
                Err(status) => break status,
            };

            let s = &next_x - &x;
            let y = next.lagrangian_gradient(&multipliers) - current.lagrangian_gradient(&multipliers);
            damped_bfgs_update(&mut hessian, &mut hessian_inv, &s, &y);

            let previous_f = current.f;
            x = next_x;
            current = next;
            trace!(iteration = iterations, f = current.f, alpha, "sqp step");

            let feasible = current.max_violation() <= self.config.constraint_tol;
            if feasible && self.config.f_tol_rel > 0.0 && (current.f - previous_f).abs() <= self.config.f_tol_rel * current.f.abs() {
                break SolverStatus::FtolReached;
            }
            if feasible && self.is_small_step(&s, &x) {
                break SolverStatus::XtolReached;
            }
        };

        debug!(
            status = %status,
            evaluations = budget.evaluations,
            iterations,
            f = current.f,
            "sqp finished"
        );
        outcome(status, x, &current, &budget, iterations)
    }

    fn is_small_step(&self, step: &DVector<f64>, x: &DVector<f64>) -> bool {
        step.iter()
            .zip(x.iter())
            .all(|(d, xi)| d.abs() <= self.config.x_tol_rel * xi.abs() + self.config.x_tol_abs)
    }
}

fn outcome(status: SolverStatus, x: DVector<f64>, evaluation: &Evaluation, budget: &Budget, iterations: usize) -> SqpOutcome {
    SqpOutcome {
        status,
        x,
        f: evaluation.f,
        max_violation: if evaluation.c.is_empty() { 0.0 } else { evaluation.max_violation() },
        evaluations: budget.evaluations,
        iterations,
    }
}

fn clamp(x: &DVector<f64>, lb: &DVector<f64>, ub: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter().zip(lb.iter().zip(ub.iter())).map(|(v, (l, u))| v.max(*l).min(*u)),
    )
}

/// Stack the linearized constraints and the step bounds into `A d <= b`
fn local_constraints(
    evaluation: &Evaluation,
    x: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = x.len();
    let m = evaluation.c.len();
    let bounded: Vec<(usize, f64)> = (0..n)
        .flat_map(|i| {
            let upper = ub[i].is_finite().then(|| (i, 1.0));
            let lower = lb[i].is_finite().then(|| (i, -1.0));
            upper.into_iter().chain(lower)
        })
        .collect();

    let rows = m + bounded.len();
    let mut a = DMatrix::zeros(rows, n);
    let mut b = DVector::zeros(rows);
    if m > 0 {
        a.rows_mut(0, m).copy_from(&evaluation.jac);
        b.rows_mut(0, m).copy_from(&(-&evaluation.c));
    }
    for (k, (i, sign)) in bounded.into_iter().enumerate() {
        let row = m + k;
        a[(row, i)] = sign;
        b[row] = if sign > 0.0 { ub[i] - x[i] } else { x[i] - lb[i] };
    }
    (a, b)
}

/// Powell-damped BFGS update keeping `hessian` positive definite, applied to the
/// inverse with the same damped pair
fn damped_bfgs_update(hessian: &mut DMatrix<f64>, hessian_inv: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let bs = &*hessian * s;
    let sbs = s.dot(&bs);
    if sbs <= 1e-16 {
        return;
    }
    let sy = s.dot(y);
    let theta = if sy >= 0.2 * sbs { 1.0 } else { 0.8 * sbs / (sbs - sy) };
    let r = y * theta + &bs * (1.0 - theta);
    let sr = s.dot(&r);
    if sr <= 1e-16 {
        return;
    }
    *hessian -= &bs * bs.transpose() / sbs;
    *hessian += &r * r.transpose() / sr;

    // H+ = (I - s r' / sr) H (I - r s' / sr) + s s' / sr
    let hr = &*hessian_inv * &r;
    let rhr = r.dot(&hr);
    *hessian_inv -= (s * hr.transpose() + &hr * s.transpose()) / sr;
    *hessian_inv += s * s.transpose() * ((rhr / sr + 1.0) / sr);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `f(x) = sum w_i (x_i - t_i)^2` with optional constraint `1 - x_0 - x_1 <= 0`
    struct Quadratic {
        weights: Vec<f64>,
        target: Vec<f64>,
        lower: f64,
        upper: f64,
        constrained: bool,
    }

    impl NonlinearProblem for Quadratic {
        fn dimension(&self) -> usize {
            self.target.len()
        }

        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(self.target.len(), self.lower)
        }

        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(self.target.len(), self.upper)
        }

        fn num_inequality_constraints(&self) -> usize {
            usize::from(self.constrained)
        }

        fn objective(&mut self, x: &DVector<f64>, grad: Option<&mut DVector<f64>>) -> f64 {
            if let Some(grad) = grad {
                for i in 0..x.len() {
                    grad[i] = 2.0 * self.weights[i] * (x[i] - self.target[i]);
                }
            }
            (0..x.len())
                .map(|i| self.weights[i] * (x[i] - self.target[i]).powi(2))
                .sum()
        }

        fn inequality_constraints(
            &mut self,
            x: &DVector<f64>,
            result: &mut DVector<f64>,
            jacobian: Option<&mut DMatrix<f64>>,
        ) {
            result[0] = 1.0 - x[0] - x[1];
            if let Some(jacobian) = jacobian {
                jacobian[(0, 0)] = -1.0;
                jacobian[(0, 1)] = -1.0;
            }
        }
    }

    struct Rosenbrock;

    impl NonlinearProblem for Rosenbrock {
        fn dimension(&self) -> usize {
            2
        }

        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, -2.0)
        }

        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, 2.0)
        }

        fn num_inequality_constraints(&self) -> usize {
            0
        }

        fn objective(&mut self, x: &DVector<f64>, grad: Option<&mut DVector<f64>>) -> f64 {
            let (a, b) = (x[0], x[1]);
            if let Some(grad) = grad {
                grad[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
                grad[1] = 200.0 * (b - a * a);
            }
            (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
        }

        fn inequality_constraints(&mut self, _x: &DVector<f64>, _result: &mut DVector<f64>, _jacobian: Option<&mut DMatrix<f64>>) {}
    }

    struct NotANumber;

    impl NonlinearProblem for NotANumber {
        fn dimension(&self) -> usize {
            1
        }

        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, -1.0)
        }

        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, 1.0)
        }

        fn num_inequality_constraints(&self) -> usize {
            0
        }

        fn objective(&mut self, _x: &DVector<f64>, _grad: Option<&mut DVector<f64>>) -> f64 {
            f64::NAN
        }

        fn inequality_constraints(&mut self, _x: &DVector<f64>, _result: &mut DVector<f64>, _jacobian: Option<&mut DMatrix<f64>>) {}
    }

    fn quadratic(constrained: bool) -> Quadratic {
        Quadratic {
            weights: vec![1.0, 10.0],
            target: vec![1.0, -2.0],
            lower: -10.0,
            upper: 10.0,
            constrained,
        }
    }

    #[test]
    fn test_unconstrained_quadratic() {
        let solver = SqpSolver::with_defaults();
        let mut problem = quadratic(false);
        let out = solver.minimize(&mut problem, &DVector::from_vec(vec![5.0, 5.0]));
        assert!(out.status.is_usable(), "status {}", out.status);
        assert!((out.x[0] - 1.0).abs() < 1e-4);
        assert!((out.x[1] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_active_bound() {
        let solver = SqpSolver::with_defaults();
        let mut problem = quadratic(false);
        problem.upper = 0.5;
        let out = solver.minimize(&mut problem, &DVector::from_vec(vec![0.0, 0.0]));
        assert!(out.status.is_usable());
        assert!((out.x[0] - 0.5).abs() < 1e-6);
        assert!((out.x[1] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_linear_inequality_constraint() {
        // min (x-1)^2 + 10 (y+2)^2  s.t. x + y >= 1  ->  x = 31/11, y = -20/11
        let solver = SqpSolver::with_defaults();
        let mut problem = quadratic(true);
        let out = solver.minimize(&mut problem, &DVector::from_vec(vec![0.0, 0.0]));
        assert!(out.status.is_usable(), "status {}", out.status);
        assert!((out.x[0] - 31.0 / 11.0).abs() < 1e-3);
        assert!((out.x[1] + 20.0 / 11.0).abs() < 1e-3);
        assert!(out.max_violation < 1e-4);
    }

    #[test]
    fn test_rosenbrock_within_bounds() {
        let solver = SqpSolver::new(SqpConfig {
            x_tol_rel: 1e-10,
            x_tol_abs: 1e-10,
            max_evaluations: 5000,
            ..SqpConfig::default()
        });
        let out = solver.minimize(&mut Rosenbrock, &DVector::from_vec(vec![-1.2, 1.0]));
        assert!(out.status.is_usable(), "status {}", out.status);
        assert!(out.f < 1e-4, "f = {}", out.f);
        assert!((out.x[0] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_evaluation_budget() {
        let solver = SqpSolver::new(SqpConfig {
            max_evaluations: 3,
            x_tol_rel: 0.0,
            x_tol_abs: 0.0,
            ..SqpConfig::default()
        });
        let out = solver.minimize(&mut Rosenbrock, &DVector::from_vec(vec![-1.2, 1.0]));
        assert_eq!(out.status, SolverStatus::MaxevalReached);
        assert_eq!(out.evaluations, 3);
    }

    #[test]
    fn test_invalid_bounds() {
        let solver = SqpSolver::with_defaults();
        let mut problem = quadratic(false);
        problem.lower = 1.0;
        problem.upper = -1.0;
        let out = solver.minimize(&mut problem, &DVector::zeros(2));
        assert_eq!(out.status, SolverStatus::InvalidArgs);
        assert_eq!(out.evaluations, 0);
    }

    #[test]
    fn test_non_finite_objective() {
        let solver = SqpSolver::with_defaults();
        let out = solver.minimize(&mut NotANumber, &DVector::zeros(1));
        assert_eq!(out.status, SolverStatus::Failure);
        assert!(!out.status.is_usable());
        assert_eq!(out.evaluations, 1);
    }

    #[test]
    fn test_time_budget_is_checked_before_the_first_step() {
        let solver = SqpSolver::new(SqpConfig {
            max_time: 1e-9,
            ..SqpConfig::default()
        });
        let out = solver.minimize(&mut Rosenbrock, &DVector::from_vec(vec![-1.2, 1.0]));
        assert_eq!(out.status, SolverStatus::MaxtimeReached);
        assert_eq!(out.evaluations, 1);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x, DVector::from_vec(vec![-1.2, 1.0]));
    }

    #[test]
    fn test_inverse_update_stays_consistent() {
        let mut hessian = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let mut hessian_inv = hessian.clone().try_inverse().unwrap();
        let steps = [([1.0, 0.0], [3.0, 1.0]), ([0.3, -0.7], [-0.2, 0.4]), ([0.0, 1.0], [0.1, 2.0])];
        for (s, y) in steps {
            let (s, y) = (DVector::from_vec(s.to_vec()), DVector::from_vec(y.to_vec()));
            damped_bfgs_update(&mut hessian, &mut hessian_inv, &s, &y);
            let product = &hessian * &hessian_inv;
            assert!((product - DMatrix::<f64>::identity(2, 2)).norm() < 1e-9);
        }
    }

    #[test]
    fn test_stationary_start_terminates_immediately() {
        let solver = SqpSolver::with_defaults();
        let mut problem = quadratic(false);
        let out = solver.minimize(&mut problem, &DVector::from_vec(vec![1.0, -2.0]));
        assert_eq!(out.status, SolverStatus::XtolReached);
        assert_eq!(out.evaluations, 1);
    }
}
