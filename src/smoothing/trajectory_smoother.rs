//! Nonlinear smoothing of coarse trajectories
//!
//! The coarse trajectory is resampled onto a finer time grid (`subsampling`
//! intermediate steps between consecutive points). The decision variables are
//! the jerk and curvature rate at every fine step; states follow by integrating
//! the second-order kinematic model from the initial point, so the initial state
//! constraint holds by construction.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, error, info, warn};

use super::params::{interpolate_within_bounds, round_to, ProblemParameters, SolverParameters};
use crate::common::{
    normalize_angle, DiscretizedTrajectory, PathPoint, PlanningError, PlanningResult, Point2D,
    TrajectoryPoint,
};
use crate::kinematics::integration::{integrate, integrate_states, Integration};
use crate::kinematics::model::{
    state, InputVector, SecondOrderKinematicModel, StateVector, INPUT_J, INPUT_SIZE, INPUT_XI,
    STATE_A, STATE_KAPPA, STATE_SIZE, STATE_THETA, STATE_V, STATE_X, STATE_Y,
};
use crate::optimization::{NonlinearProblem, SolverStatus, SqpConfig, SqpSolver};

/// Decimal places kept for the relative time of smoothed points
const TIME_PRECISION: u32 = 4;

/// Acceleration, curvature and velocity of every integrated state are bounded
const NUM_CONSTRAINED_STATES: usize = 3;

/// Result of [`TrajectorySmoother::initialize_problem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// A single point leaves nothing to smooth
    NoSmoothingNeeded,
}

/// Bound violations found in a smoothed trajectory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub jerk_violations: usize,
    pub curvature_change_violations: usize,
    pub acceleration_violations: usize,
    pub curvature_violations: usize,
    pub velocity_violations: usize,
    pub initial_state_mismatch: bool,
}

impl ValidationReport {
    pub fn total_violations(&self) -> usize {
        self.jerk_violations
            + self.curvature_change_violations
            + self.acceleration_violations
            + self.curvature_violations
            + self.velocity_violations
    }

    pub fn is_valid(&self) -> bool {
        self.total_violations() == 0 && !self.initial_state_mismatch
    }
}

/// Last integration, keyed by the input vector it was computed for
#[derive(Debug, Default)]
struct IntegrationCache {
    entry: Option<(DVector<f64>, Integration)>,
}

impl IntegrationCache {
    fn get(
        &mut self,
        model: &SecondOrderKinematicModel,
        x0: &StateVector,
        h: f64,
        u: &DVector<f64>,
    ) -> &Integration {
        if self.entry.as_ref().map_or(false, |(cached, _)| cached != u) {
            self.entry = None;
        }
        &self
            .entry
            .get_or_insert_with(|| (u.clone(), integrate(model, x0, &to_inputs(u), h)))
            .1
    }
}

fn to_inputs(u: &DVector<f64>) -> Vec<InputVector> {
    u.as_slice()
        .chunks(INPUT_SIZE)
        .map(|c| InputVector::new(c[INPUT_J], c[INPUT_XI]))
        .collect()
}

/// The smoothing NLP over the fine grid
struct SmoothingProblem {
    params: ProblemParameters,
    model: SecondOrderKinematicModel,
    x0: StateVector,
    /// `(fine step, reference state)` for every coarse point
    references: Vec<(usize, StateVector)>,
    steps: usize,
    h: f64,
    initial_time: f64,
    /// Seed before, solution after the optimization
    u: DVector<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    cache: IntegrationCache,
    evaluations: usize,
}

impl SmoothingProblem {
    /// `(state component, lower, upper)` for every constrained state
    fn state_bounds(&self) -> [(usize, f64, f64); NUM_CONSTRAINED_STATES] {
        let p = &self.params;
        [
            (STATE_A, p.lower_bound_acceleration, p.upper_bound_acceleration),
            (STATE_KAPPA, p.lower_bound_curvature, p.upper_bound_curvature),
            (STATE_V, p.lower_bound_velocity, p.upper_bound_velocity),
        ]
    }

    fn states(&self) -> Vec<StateVector> {
        integrate_states(&self.model, &self.x0, &to_inputs(&self.u), self.h)
    }
}

impl NonlinearProblem for SmoothingProblem {
    fn dimension(&self) -> usize {
        self.steps * INPUT_SIZE
    }

    fn lower_bounds(&self) -> DVector<f64> {
        self.lower.clone()
    }

    fn upper_bounds(&self) -> DVector<f64> {
        self.upper.clone()
    }

    fn num_inequality_constraints(&self) -> usize {
        2 * NUM_CONSTRAINED_STATES * (self.steps - 1)
    }

    fn objective(&mut self, x: &DVector<f64>, grad: Option<&mut DVector<f64>>) -> f64 {
        self.evaluations += 1;
        let integration = self.cache.get(&self.model, &self.x0, self.h, x);
        let p = &self.params;

        let mut f = 0.0;
        let mut direct = DVector::<f64>::zeros(x.len());
        let mut d_states = DVector::<f64>::zeros(STATE_SIZE * self.steps);

        for k in 0..self.steps {
            let j = x[k * INPUT_SIZE + INPUT_J];
            let xi = x[k * INPUT_SIZE + INPUT_XI];
            let smooth_abs = (j * j + p.jerk_smoothing_epsilon).sqrt();
            f += p.cost_jerk * smooth_abs + p.cost_curvature_change * xi * xi;
            direct[k * INPUT_SIZE + INPUT_J] = p.cost_jerk * j / smooth_abs;
            direct[k * INPUT_SIZE + INPUT_XI] = 2.0 * p.cost_curvature_change * xi;
        }

        for k in 1..self.steps {
            let s = &integration.states[k];
            let row = k * STATE_SIZE;
            f += p.cost_curvature * s[STATE_KAPPA].powi(2) + p.cost_acceleration * s[STATE_A].powi(2);
            d_states[row + STATE_KAPPA] += 2.0 * p.cost_curvature * s[STATE_KAPPA];
            d_states[row + STATE_A] += 2.0 * p.cost_acceleration * s[STATE_A];
        }

        for (step, reference) in &self.references {
            let s = &integration.states[*step];
            let row = step * STATE_SIZE;
            let dx = s[STATE_X] - reference[STATE_X];
            let dy = s[STATE_Y] - reference[STATE_Y];
            let dtheta = normalize_angle(s[STATE_THETA] - reference[STATE_THETA]);
            let dv = s[STATE_V] - reference[STATE_V];
            f += p.cost_offset_x * dx * dx
                + p.cost_offset_y * dy * dy
                + p.cost_offset_theta * dtheta * dtheta
                + p.cost_offset_v * dv * dv;
            d_states[row + STATE_X] += 2.0 * p.cost_offset_x * dx;
            d_states[row + STATE_Y] += 2.0 * p.cost_offset_y * dy;
            d_states[row + STATE_THETA] += 2.0 * p.cost_offset_theta * dtheta;
            d_states[row + STATE_V] += 2.0 * p.cost_offset_v * dv;
        }

        if let Some(grad) = grad {
            let chained = integration.sensitivity.tr_mul(&d_states);
            grad.copy_from(&(direct + chained));
        }
        f
    }

    fn inequality_constraints(
        &mut self,
        x: &DVector<f64>,
        result: &mut DVector<f64>,
        jacobian: Option<&mut DMatrix<f64>>,
    ) {
        let bounds = self.state_bounds();
        let integration = self.cache.get(&self.model, &self.x0, self.h, x);

        let mut rows = Vec::with_capacity(result.len());
        let mut row = 0;
        for k in 1..self.steps {
            let s = &integration.states[k];
            for &(component, lower, upper) in &bounds {
                // value - upper <= 0
                result[row] = s[component] - upper;
                // lower - value <= 0
                result[row + 1] = lower - s[component];
                rows.push((row, k * STATE_SIZE + component));
                row += 2;
            }
        }

        if let Some(jacobian) = jacobian {
            jacobian.fill(0.0);
            let sensitivity = &integration.sensitivity;
            for (row, sensitivity_row) in rows {
                for col in 0..sensitivity.ncols() {
                    let d = sensitivity[(sensitivity_row, col)];
                    jacobian[(row, col)] = d;
                    jacobian[(row + 1, col)] = -d;
                }
            }
        }
    }
}

/// Refines a coarse trajectory under jerk, curvature rate and state bounds
pub struct TrajectorySmoother {
    params: ProblemParameters,
    solver_params: SolverParameters,
    /// Subtracted from positions while optimizing
    point_offset: Point2D,
    problem: Option<SmoothingProblem>,
    status: SolverStatus,
}

impl TrajectorySmoother {
    pub fn new(params: ProblemParameters, solver_params: SolverParameters) -> Self {
        Self::with_point_offset(params, solver_params, Point2D::origin())
    }

    pub fn with_point_offset(
        params: ProblemParameters,
        solver_params: SolverParameters,
        point_offset: Point2D,
    ) -> Self {
        Self {
            params,
            solver_params,
            point_offset,
            problem: None,
            status: SolverStatus::NotInitialized,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ProblemParameters::default(), SolverParameters::default())
    }

    pub fn params(&self) -> &ProblemParameters {
        &self.params
    }

    pub fn solver_params(&self) -> &SolverParameters {
        &self.solver_params
    }

    pub fn set_solver_params(&mut self, solver_params: SolverParameters) {
        self.solver_params = solver_params;
    }

    /// Status of the last [`optimize`](Self::optimize) call
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Objective evaluations since the last initialization
    pub fn num_evaluations(&self) -> usize {
        self.problem.as_ref().map_or(0, |p| p.evaluations)
    }

    /// Current decision vector `[j_0, xi_0, j_1, xi_1, ...]`
    pub fn input_vector(&self) -> Option<&DVector<f64>> {
        self.problem.as_ref().map(|p| &p.u)
    }

    fn to_state(&self, point: &TrajectoryPoint) -> StateVector {
        state(
            point.x() - self.point_offset.x,
            point.y() - self.point_offset.y,
            point.theta(),
            point.v,
            point.a,
            point.kappa(),
        )
    }

    /// Tracking reference for `point`, pulled inside the state bounds
    fn reference_state(&self, point: &TrajectoryPoint) -> StateVector {
        let p = &self.params;
        let mut reference = self.to_state(point);
        reference[STATE_V] = p.bounded_velocity(reference[STATE_V]);
        reference[STATE_A] = p.bounded_acceleration(reference[STATE_A]);
        reference[STATE_KAPPA] = p.bounded_curvature(reference[STATE_KAPPA]);
        reference
    }

    /// Build the problem for `input_trajectory`, pinned to `init_point`
    ///
    /// # Arguments
    /// * `subsampling` - Intermediate fine steps between consecutive input points
    /// * `input_trajectory` - Coarse trajectory, also the tracking reference
    /// * `init_point` - Initial state of the vehicle
    pub fn initialize_problem(
        &mut self,
        subsampling: usize,
        input_trajectory: &DiscretizedTrajectory,
        init_point: &TrajectoryPoint,
    ) -> PlanningResult<InitOutcome> {
        self.problem = None;
        self.status = SolverStatus::NotInitialized;

        let num_points = input_trajectory.len();
        if num_points == 0 {
            error!("empty input trajectory");
            return Err(PlanningError::InvalidInput(
                "smoothing input trajectory is empty".to_string(),
            ));
        }
        if num_points == 1 {
            info!("input trajectory has a single point, no smoothing needed");
            return Ok(InitOutcome::NoSmoothingNeeded);
        }

        let initial_time = input_trajectory[0].relative_time;
        let final_time = input_trajectory[num_points - 1].relative_time;
        if !(final_time > initial_time) {
            return Err(PlanningError::InvalidInput(format!(
                "smoothing input does not advance in time ({} -> {})",
                initial_time, final_time
            )));
        }

        let stride = subsampling + 1;
        let steps = num_points + (num_points - 1) * subsampling;
        let h = (final_time - initial_time) / (steps - 1) as f64;

        let references = input_trajectory
            .iter()
            .enumerate()
            .map(|(r, point)| (r * stride, self.reference_state(point)))
            .collect();

        // seed: input rates interpolated between the coarse points
        let p = &self.params;
        let mut u = DVector::zeros(steps * INPUT_SIZE);
        for k in 0..steps {
            let r0 = (k / stride).min(num_points - 1);
            let r1 = (r0 + 1).min(num_points - 1);
            let (p0, p1) = (&input_trajectory[r0], &input_trajectory[r1]);
            let (k0, k1) = (r0 * stride, r1 * stride);
            let jerk = interpolate_within_bounds(k0, p0.da, k1, p1.da, k);
            let xi = interpolate_within_bounds(k0, p0.path_point.dkappa, k1, p1.path_point.dkappa, k);
            u[k * INPUT_SIZE + INPUT_J] = p.bounded_jerk(jerk);
            u[k * INPUT_SIZE + INPUT_XI] = p.bounded_curvature_change(xi);
        }
        let lower = DVector::from_fn(steps * INPUT_SIZE, |i, _| {
            if i % INPUT_SIZE == INPUT_J {
                p.lower_bound_jerk
            } else {
                p.lower_bound_curvature_change
            }
        });
        let upper = DVector::from_fn(steps * INPUT_SIZE, |i, _| {
            if i % INPUT_SIZE == INPUT_J {
                p.upper_bound_jerk
            } else {
                p.upper_bound_curvature_change
            }
        });

        debug!(num_points, subsampling, steps, h, "smoothing problem initialized");
        self.problem = Some(SmoothingProblem {
            params: self.params.clone(),
            model: SecondOrderKinematicModel::new(),
            x0: self.to_state(init_point),
            references,
            steps,
            h,
            initial_time,
            u,
            lower,
            upper,
            cache: IntegrationCache::default(),
            evaluations: 0,
        });
        Ok(InitOutcome::Ready)
    }

    /// Run the solver on the initialized problem
    pub fn optimize(&mut self) -> SolverStatus {
        let problem = match self.problem.as_mut() {
            Some(problem) => problem,
            None => {
                error!("smoothing problem was not initialized");
                self.status = SolverStatus::NotInitialized;
                return self.status;
            }
        };

        let solver = SqpSolver::new(SqpConfig::from(&self.solver_params));
        let seed = problem.u.clone();
        let outcome = solver.minimize(problem, &seed);

        match outcome.status {
            SolverStatus::RoundoffLimited => {
                warn!(status = %outcome.status, "roundoff errors limited smoothing progress")
            }
            status if status.is_usable() => info!(
                status = %status,
                evaluations = outcome.evaluations,
                cost = outcome.f,
                "smoothing optimization successful"
            ),
            status => error!(status = %status, "smoothing optimization failed"),
        }

        if outcome.status.is_usable() {
            problem.u = outcome.x;
        }
        self.status = outcome.status;
        self.status
    }

    /// Fine-grid trajectory for the current decision vector
    pub fn optimized_trajectory(&self) -> DiscretizedTrajectory {
        let problem = match &self.problem {
            Some(problem) => problem,
            None => return DiscretizedTrajectory::new(),
        };

        let states = problem.states();
        let mut trajectory = DiscretizedTrajectory::new();
        for (k, s) in states.iter().enumerate() {
            let path_point = PathPoint {
                x: s[STATE_X] + self.point_offset.x,
                y: s[STATE_Y] + self.point_offset.y,
                s: 0.0,
                theta: s[STATE_THETA],
                kappa: s[STATE_KAPPA],
                dkappa: problem.u[k * INPUT_SIZE + INPUT_XI],
            };
            let mut point = TrajectoryPoint::new(
                path_point,
                s[STATE_V],
                s[STATE_A],
                round_to(problem.initial_time + k as f64 * problem.h, TIME_PRECISION),
            );
            point.da = problem.u[k * INPUT_SIZE + INPUT_J];
            trajectory.push(point);
        }
        trajectory.recompute_s();
        trajectory
    }

    /// Check inputs and integrated states of the current solution against their bounds
    pub fn validate_solution(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let problem = match &self.problem {
            Some(problem) => problem,
            None => return report,
        };
        let p = &self.params;

        for (k, input) in to_inputs(&problem.u).iter().enumerate() {
            if !p.is_jerk_within_bounds(input[INPUT_J]) {
                warn!(step = k, jerk = input[INPUT_J], "jerk out of bounds");
                report.jerk_violations += 1;
            }
            if !p.is_curvature_change_within_bounds(input[INPUT_XI]) {
                warn!(step = k, xi = input[INPUT_XI], "curvature change out of bounds");
                report.curvature_change_violations += 1;
            }
        }

        let states = problem.states();
        let mismatch = (states[0] - problem.x0).amax();
        if !(mismatch <= self.solver_params.eq_const_tol) {
            warn!(mismatch, "smoothed trajectory does not start at the initial point");
            report.initial_state_mismatch = true;
        }
        for (k, s) in states.iter().enumerate().skip(1) {
            if !p.is_acceleration_within_bounds(s[STATE_A]) {
                debug!(step = k, a = s[STATE_A], "acceleration out of bounds");
                report.acceleration_violations += 1;
            }
            if !p.is_curvature_within_bounds(s[STATE_KAPPA]) {
                debug!(step = k, kappa = s[STATE_KAPPA], "curvature out of bounds");
                report.curvature_violations += 1;
            }
            if !p.is_velocity_within_bounds(s[STATE_V]) {
                debug!(step = k, v = s[STATE_V], "velocity out of bounds");
                report.velocity_violations += 1;
            }
        }
        if !report.is_valid() {
            warn!(violations = report.total_violations(), "smoothed trajectory violates bounds");
        }
        report
    }
}

/// Initialize, optimize and validate in one go
///
/// Positions are optimized relative to `init_point`. Bound violations found by the
/// validation are logged but do not reject the result.
pub fn smooth_trajectory(
    trajectory: &DiscretizedTrajectory,
    init_point: &TrajectoryPoint,
    subsampling: usize,
    params: &ProblemParameters,
    solver_params: &SolverParameters,
) -> PlanningResult<DiscretizedTrajectory> {
    let mut smoother = TrajectorySmoother::with_point_offset(
        params.clone(),
        solver_params.clone(),
        init_point.position(),
    );
    match smoother.initialize_problem(subsampling, trajectory, init_point)? {
        InitOutcome::NoSmoothingNeeded => return Ok(trajectory.clone()),
        InitOutcome::Ready => {}
    }

    let status = smoother.optimize();
    match status {
        SolverStatus::SolverException => {
            return Err(PlanningError::SolverException(format!(
                "smoothing solver raised {}",
                status
            )))
        }
        status if !status.is_usable() => {
            return Err(PlanningError::SmoothingFailure(format!(
                "solver status {}",
                status
            )))
        }
        _ => {}
    }

    smoother.validate_solution();
    let smoothed = smoother.optimized_trajectory();
    let all_finite = smoothed.iter().all(|point| {
        [point.x(), point.y(), point.theta(), point.kappa(), point.v, point.a]
            .iter()
            .all(|value| value.is_finite())
    });
    if !all_finite {
        return Err(PlanningError::SmoothingFailure(
            "smoothed trajectory is not finite".to_string(),
        ));
    }
    Ok(smoothed)
}
