//! Deterministic engine that follows the reference polyline
//!
//! The car moves along its reference with an acceleration-bounded velocity profile,
//! blending out its initial lateral offset over the horizon. When it is not tracking
//! the reference position it approaches the point `desired_offset` ahead on a
//! comfortable braking profile instead. A solve fails when a hard obstacle covers the
//! planned position at any step, when a planned position leaves the map, or when the
//! wall-clock budget runs out.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::common::{normalize_angle, Point2D};

use super::config::EngineSettings;
use super::engine::{
    CarHandle, CarSpec, CarUpdate, DiscreteEngine, InflatedObstacle, ObstacleHandle, SecondOrderState,
};
use super::reference_line::{interpolate_polyline, project_onto_polyline};
use super::wire::RawTrajectory;
use crate::geometry::point_in_polygon;

/// Deceleration used to approach a stop point, as a fraction of the braking limit
const COMFORT_BRAKING_RATIO: f64 = 0.5;
/// Arc length step of the curvature estimate [m]
const CURVATURE_DS: f64 = 1.0;
const MIN_CURVATURE: f64 = 1e-6;

/// Planned state without its time stamp: `[x, y, vx, vy, ax, ay]`
type PlannedState = [f64; 6];

#[derive(Debug, Clone)]
struct EgoCar {
    initial_state: SecondOrderState,
    reference: Vec<Point2D>,
    desired_velocity: f64,
    desired_offset: f64,
    track_reference_position: bool,
    timestamp: f64,
    solution: Option<Vec<PlannedState>>,
}

#[derive(Debug, Clone)]
struct EngineObstacle {
    inflated: InflatedObstacle,
    is_static: bool,
    is_soft: bool,
}

pub struct ReferenceFollowingEngine {
    settings: EngineSettings,
    cars: Vec<EgoCar>,
    obstacles: Vec<EngineObstacle>,
    map: Vec<Point2D>,
}

impl ReferenceFollowingEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            cars: Vec::new(),
            obstacles: Vec::new(),
            map: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineSettings::default())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn num_cars(&self) -> usize {
        self.cars.len()
    }

    pub fn num_obstacles(&self) -> usize {
        self.obstacles.len()
    }

    pub fn num_static_obstacles(&self) -> usize {
        self.obstacles.iter().filter(|o| o.is_static).count()
    }

    /// Reference polyline, or a straight line along the current heading when the
    /// car has none
    fn effective_reference(car: &EgoCar) -> Vec<Point2D> {
        if car.reference.len() >= 2 {
            return car.reference.clone();
        }
        let state = &car.initial_state;
        let heading = state.vy.atan2(state.vx);
        let start = state.position();
        vec![start, start + Point2D::from_heading(heading)]
    }

    fn curvature_at(reference: &[Point2D], s: f64) -> f64 {
        match (
            interpolate_polyline(reference, s - CURVATURE_DS),
            interpolate_polyline(reference, s + CURVATURE_DS),
        ) {
            (Some((_, theta_back)), Some((_, theta_ahead))) => {
                normalize_angle(theta_ahead - theta_back) / (2.0 * CURVATURE_DS)
            }
            _ => 0.0,
        }
    }

    /// Velocity target at arc length `s`
    fn target_velocity(&self, car: &EgoCar, reference: &[Point2D], s: f64, s_stop: f64, v: f64) -> f64 {
        let mut target = if car.track_reference_position {
            car.desired_velocity
        } else {
            let braking = -self.settings.acc_lon_min_limit * COMFORT_BRAKING_RATIO;
            let remaining = (s_stop - s).max(0.0);
            (2.0 * braking * remaining).sqrt().min(car.desired_velocity.max(v))
        };
        let kappa = Self::curvature_at(reference, s).abs();
        if kappa > MIN_CURVATURE {
            target = target.min((self.settings.acc_lat_min_max_limit / kappa).sqrt());
        }
        target.max(0.0)
    }

    /// States along the reference; `None` once `deadline` passes
    fn follow_reference(&self, car: &EgoCar, deadline: Option<Instant>) -> Option<Vec<PlannedState>> {
        let n = self.settings.nr_steps;
        let ts = self.settings.ts;
        let reference = Self::effective_reference(car);
        let state = car.initial_state;

        let mut planned = Vec::with_capacity(n);
        planned.push([state.x, state.y, state.vx, state.vy, state.ax, state.ay]);

        let (s0, lateral0) = project_onto_polyline(&reference, state.position())
            .map_or((0.0, 0.0), |p| (p.s, p.lateral));
        let s_stop = s0 + car.desired_offset;
        let mut s = s0;
        let mut v = state.speed();

        for i in 1..n {
            if past(deadline) {
                return None;
            }
            let target = self.target_velocity(car, &reference, s, s_stop, v);
            let mut a = ((target - v) / ts).clamp(self.settings.acc_lon_min_limit, self.settings.acc_lon_max_limit);
            let mut v_next = v + a * ts;
            if v_next <= 0.0 {
                v_next = 0.0;
                a = -v / ts;
            }
            s += 0.5 * (v + v_next) * ts;
            v = v_next;

            let lateral = if n > 1 {
                lateral0 * (1.0 - i as f64 / (n - 1) as f64)
            } else {
                0.0
            };
            let (foot, theta) = match interpolate_polyline(&reference, s) {
                Some(p) => p,
                None => break,
            };
            let normal = Point2D::new(-theta.sin(), theta.cos());
            let position = foot + normal * lateral;
            let kappa = Self::curvature_at(&reference, s);
            let (sin, cos) = theta.sin_cos();
            let centripetal = v * v * kappa;
            planned.push([
                position.x,
                position.y,
                v * cos,
                v * sin,
                a * cos - centripetal * sin,
                a * sin + centripetal * cos,
            ]);
        }
        Some(planned)
    }

    fn to_raw(states: &[PlannedState], time_offset: f64, ts: f64) -> RawTrajectory {
        let mut raw = RawTrajectory::with_capacity(states.len());
        for (i, [x, y, vx, vy, ax, ay]) in states.iter().copied().enumerate() {
            raw.push_record([time_offset + i as f64 * ts, x, y, vx, vy, ax, ay]);
        }
        raw
    }

    fn blocking_obstacle(&self, planned: &[PlannedState]) -> Option<usize> {
        self.obstacles
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_soft)
            .find(|(_, obstacle)| {
                planned.iter().enumerate().any(|(step, state)| {
                    obstacle
                        .inflated
                        .polygon_at(step)
                        .map_or(false, |polygon| polygon.is_point_in(&Point2D::new(state[0], state[1])))
                })
            })
            .map(|(index, _)| index)
    }

    fn leaves_map(&self, planned: &[PlannedState]) -> bool {
        self.map.len() >= 3
            && planned
                .iter()
                .skip(1)
                .any(|state| !point_in_polygon(&Point2D::new(state[0], state[1]), &self.map))
    }
}

impl DiscreteEngine for ReferenceFollowingEngine {
    fn create(settings: EngineSettings) -> Self {
        Self::new(settings)
    }

    fn horizon_len(&self) -> usize {
        self.settings.nr_steps
    }

    fn timestep(&self) -> f64 {
        self.settings.ts
    }

    fn collision_radius(&self) -> f64 {
        self.settings.collision_radius
    }

    fn add_car(&mut self, car: CarSpec) -> CarHandle {
        self.cars.push(EgoCar {
            initial_state: car.initial_state,
            reference: car.reference,
            desired_velocity: car.desired_velocity,
            desired_offset: car.desired_offset,
            track_reference_position: car.track_reference_position,
            timestamp: car.timestamp,
            solution: None,
        });
        CarHandle(self.cars.len() - 1)
    }

    fn update_car(&mut self, handle: CarHandle, update: CarUpdate) -> bool {
        match self.cars.get_mut(handle.0) {
            Some(car) => {
                car.initial_state = update.initial_state;
                car.reference = update.reference;
                car.timestamp = update.timestamp;
                car.track_reference_position = update.track_reference_position;
                true
            }
            None => false,
        }
    }

    fn update_desired_velocity(&mut self, handle: CarHandle, velocity: f64, offset: f64) -> bool {
        match self.cars.get_mut(handle.0) {
            Some(car) => {
                car.desired_velocity = velocity;
                car.desired_offset = offset;
                true
            }
            None => false,
        }
    }

    fn update_map(&mut self, polygon: &[Point2D]) {
        self.map = polygon.to_vec();
    }

    fn remove_all_obstacles(&mut self) {
        self.obstacles.clear();
    }

    fn add_obstacle(&mut self, obstacle: &InflatedObstacle, is_static: bool, is_soft: bool) -> Option<ObstacleHandle> {
        if self.obstacles.len() >= self.settings.max_obstacles {
            warn!(capacity = self.settings.max_obstacles, "engine obstacle capacity reached");
            return None;
        }
        if obstacle.len() != self.settings.nr_steps {
            warn!(
                steps = obstacle.len(),
                horizon = self.settings.nr_steps,
                "obstacle does not cover the horizon"
            );
            return None;
        }
        self.obstacles.push(EngineObstacle {
            inflated: obstacle.clone(),
            is_static,
            is_soft,
        });
        Some(ObstacleHandle(self.obstacles.len() - 1))
    }

    fn solve(&mut self, timestamp: f64) -> bool {
        let start = Instant::now();
        let deadline = Duration::try_from_secs_f64(self.settings.max_solution_time.max(0.0))
            .ok()
            .map(|budget| start + budget);
        let mut solutions = Vec::with_capacity(self.cars.len());
        for (index, car) in self.cars.iter().enumerate() {
            let planned = match self.follow_reference(car, deadline) {
                Some(planned) => planned,
                None => {
                    warn!(
                        budget = self.settings.max_solution_time,
                        car = index,
                        "engine solve exceeded its time budget"
                    );
                    return false;
                }
            };
            if let Some(obstacle) = self.blocking_obstacle(&planned) {
                debug!(car = index, obstacle, "hard obstacle blocks the reference");
                return false;
            }
            if self.leaves_map(&planned) {
                debug!(car = index, "planned positions leave the map");
                return false;
            }
            if past(deadline) {
                warn!(
                    budget = self.settings.max_solution_time,
                    "engine solve exceeded its time budget"
                );
                return false;
            }
            solutions.push(planned);
        }
        for (car, planned) in self.cars.iter_mut().zip(solutions) {
            car.solution = Some(planned);
        }
        debug!(timestamp, cars = self.cars.len(), "engine solved");
        true
    }

    fn solution_trajectory(&self, handle: CarHandle, time_offset: f64) -> Option<RawTrajectory> {
        let car = self.cars.get(handle.0)?;
        let solution = car.solution.as_ref()?;
        Some(Self::to_raw(solution, time_offset, self.settings.ts))
    }

    fn last_reference_trajectory(&self, handle: CarHandle, time_offset: f64) -> Option<RawTrajectory> {
        let car = self.cars.get(handle.0)?;
        let planned = self.follow_reference(car, None)?;
        Some(Self::to_raw(&planned, time_offset, self.settings.ts))
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::wire::{MapOffset, VX_IDX, X_IDX, Y_IDX};

    fn straight_reference(length: f64) -> Vec<Point2D> {
        (0..=length as usize).map(|i| Point2D::new(i as f64, 0.0)).collect()
    }

    fn state(v: f64, y: f64) -> SecondOrderState {
        SecondOrderState {
            x: 0.0,
            vx: v,
            ax: 0.0,
            y,
            vy: 0.0,
            ay: 0.0,
        }
    }

    fn car(v: f64, desired: f64, offset: f64, track: bool) -> CarSpec {
        CarSpec {
            initial_state: state(v, 0.0),
            reference: straight_reference(100.0),
            desired_velocity: desired,
            desired_offset: offset,
            timestamp: 0.0,
            track_reference_position: track,
        }
    }

    fn square_obstacle(center: Point2D, steps: usize) -> InflatedObstacle {
        let corners = [
            center + Point2D::new(1.0, -1.0),
            center + Point2D::new(1.0, 1.0),
            center + Point2D::new(-1.0, 1.0),
            center + Point2D::new(-1.0, -1.0),
        ];
        InflatedObstacle::new(vec![corners; steps])
    }

    #[test]
    fn test_accelerates_to_desired_velocity() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        let handle = engine.add_car(car(5.0, 8.0, 0.0, true));
        assert!(engine.solve(0.0));
        let raw = engine.solution_trajectory(handle, 0.0).unwrap();
        assert_eq!(raw.records(), 20);

        let speeds: Vec<f64> = raw.iter().map(|r| r[VX_IDX]).collect();
        assert!(speeds.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        assert!((speeds[19] - 8.0).abs() < 1e-9);
        // 2 m/s^2 limit
        assert!((speeds[1] - 5.5).abs() < 1e-9);
        assert!(raw.iter().all(|r| r[Y_IDX].abs() < 1e-12));
    }

    #[test]
    fn test_stops_near_the_desired_offset() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        let handle = engine.add_car(car(5.0, 0.0, 10.0, false));
        let raw = engine.last_reference_trajectory(handle, 1.0).unwrap();
        let last = raw.record(raw.records() - 1).unwrap();
        assert!(last[VX_IDX].abs() < 1e-12);
        assert!(last[X_IDX] > 9.5 && last[X_IDX] < 10.5);
        assert!((raw.record(1).unwrap()[0] - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_lateral_offset_is_blended_out() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        let mut spec = car(5.0, 5.0, 0.0, true);
        spec.initial_state = state(5.0, 1.0);
        let handle = engine.add_car(spec);
        let raw = engine.last_reference_trajectory(handle, 0.0).unwrap();
        assert!((raw.record(0).unwrap()[Y_IDX] - 1.0).abs() < 1e-12);
        assert!(raw.record(19).unwrap()[Y_IDX].abs() < 1e-9);
    }

    #[test]
    fn test_hard_obstacle_fails_solve_soft_does_not() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        engine.add_car(car(5.0, 8.0, 0.0, true));
        let blocker = square_obstacle(Point2D::new(15.0, 0.0), 20);

        assert!(engine.add_obstacle(&blocker, false, true).is_some());
        assert!(engine.solve(0.0));

        engine.remove_all_obstacles();
        assert_eq!(engine.num_obstacles(), 0);
        assert!(engine.add_obstacle(&blocker, true, false).is_some());
        assert_eq!(engine.num_static_obstacles(), 1);
        assert!(!engine.solve(0.0));
    }

    #[test]
    fn test_obstacle_capacity_and_horizon() {
        let settings = EngineSettings {
            max_obstacles: 1,
            ..EngineSettings::default()
        };
        let mut engine = ReferenceFollowingEngine::new(settings);
        let obstacle = square_obstacle(Point2D::new(50.0, 10.0), 20);
        assert_eq!(engine.add_obstacle(&obstacle, true, false), Some(ObstacleHandle(0)));
        assert!(engine.add_obstacle(&obstacle, true, false).is_none());
        engine.remove_all_obstacles();
        assert!(engine.add_obstacle(&square_obstacle(Point2D::origin(), 5), true, false).is_none());
    }

    #[test]
    fn test_exhausted_budget_fails_solve() {
        let settings = EngineSettings {
            max_solution_time: 0.0,
            ..EngineSettings::default()
        };
        let mut engine = ReferenceFollowingEngine::new(settings);
        let handle = engine.add_car(car(5.0, 8.0, 0.0, true));
        assert!(!engine.solve(0.0));
        assert!(engine.solution_trajectory(handle, 0.0).is_none());
        // reference trajectories are not budgeted
        assert_eq!(engine.last_reference_trajectory(handle, 0.0).unwrap().records(), 20);
    }

    #[test]
    fn test_map_constrains_solution() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        engine.add_car(car(5.0, 8.0, 0.0, true));
        engine.update_map(&[
            Point2D::new(-5.0, 3.0),
            Point2D::new(-5.0, -3.0),
            Point2D::new(200.0, -3.0),
            Point2D::new(200.0, 3.0),
        ]);
        assert!(engine.solve(0.0));
        engine.update_map(&[
            Point2D::new(-5.0, 3.0),
            Point2D::new(-5.0, -3.0),
            Point2D::new(10.0, -3.0),
            Point2D::new(10.0, 3.0),
        ]);
        assert!(!engine.solve(0.0));
    }

    #[test]
    fn test_updates_and_unknown_handles() {
        let mut engine = ReferenceFollowingEngine::with_defaults();
        let handle = engine.add_car(car(5.0, 8.0, 0.0, true));
        assert_eq!(handle, CarHandle(0));
        assert!(engine.solution_trajectory(handle, 0.0).is_none());

        let update = CarUpdate {
            initial_state: state(3.0, 0.0),
            reference: straight_reference(50.0),
            timestamp: 0.1,
            track_reference_position: true,
        };
        assert!(engine.update_car(handle, update.clone()));
        assert!(engine.update_desired_velocity(handle, 3.0, 0.0));
        assert!(!engine.update_car(CarHandle(7), update));
        assert!(!engine.update_desired_velocity(CarHandle(7), 3.0, 0.0));
        assert!(engine.last_reference_trajectory(CarHandle(7), 0.0).is_none());

        let raw = engine.last_reference_trajectory(handle, 0.0).unwrap();
        assert!(raw.iter().all(|r| (r[VX_IDX] - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_curve_speed_limit() {
        let settings = EngineSettings::default();
        let mut engine = ReferenceFollowingEngine::new(settings.clone());
        // circle of radius 10 sampled every ~1 m
        let reference: Vec<Point2D> = (0..=60)
            .map(|i| {
                let phi = i as f64 * 0.1 - std::f64::consts::FRAC_PI_2;
                Point2D::new(10.0 * phi.cos(), 10.0 + 10.0 * phi.sin())
            })
            .collect();
        let handle = engine.add_car(CarSpec {
            reference,
            ..car(3.0, 10.0, 0.0, true)
        });
        let trajectory = engine
            .last_reference_trajectory(handle, 0.0)
            .unwrap()
            .to_discretized_trajectory(MapOffset::default(), false, 0.5);
        let limit = (settings.acc_lat_min_max_limit * 10.0).sqrt();
        assert!(trajectory.iter().all(|p| p.v <= limit + 0.2));
    }
}
