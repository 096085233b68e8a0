//! Planning cycle around a discrete trajectory engine
//!
//! One call of [`MiqpPlanner::plan`] classifies the situation, feeds the engine with the
//! ego state, the reference line, the road and the obstacles, retrieves either a solved
//! or a reference trajectory, checks it for collisions and smooths it.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::common::{DiscretizedTrajectory, PathPoint, PlanningError, PlanningResult, Point2D, TrajectoryPoint};
use crate::obstacles::{process_dynamic_obstacles, process_static_obstacles, Obstacle, ProcessedObstacle};
use crate::smoothing::smooth_trajectory;

use super::collision::{check_environment_collisions, check_obstacle_collisions, CollisionReport};
use super::config::PlannerConfig;
use super::engine::{CarHandle, CarSpec, CarUpdate, DiscreteEngine, SecondOrderState};
use super::mode::{desired_motion, determine_planner_mode, DesiredMotion, ModeThresholds, PlannerMode};
use super::reference_engine::ReferenceFollowingEngine;
use super::reference_line::{cut_reference_line, remaining_distance, station, to_engine_reference, RoadBoundaries};
use super::wire::{MapOffset, RawTrajectory};

/// Inputs of one planning cycle, in map coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningRequest {
    pub init_point: TrajectoryPoint,
    pub reference_line: Vec<PathPoint>,
    pub obstacles: Vec<Obstacle>,
    pub road_boundaries: Option<RoadBoundaries>,
    /// Distance to the stop point; the end of the reference line when absent [m]
    pub stop_distance: Option<f64>,
    pub timestamp: f64,
}

impl PlanningRequest {
    pub fn new(init_point: TrajectoryPoint, reference_line: Vec<PathPoint>) -> Self {
        Self {
            init_point,
            reference_line,
            obstacles: Vec::new(),
            road_boundaries: None,
            stop_distance: None,
            timestamp: 0.0,
        }
    }

    pub fn with_obstacles(mut self, obstacles: Vec<Obstacle>) -> Self {
        self.obstacles = obstacles;
        self
    }

    pub fn with_road_boundaries(mut self, boundaries: RoadBoundaries) -> Self {
        self.road_boundaries = Some(boundaries);
        self
    }

    pub fn with_stop_distance(mut self, stop_distance: f64) -> Self {
        self.stop_distance = Some(stop_distance);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Result of one planning cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningOutput {
    pub trajectory: DiscretizedTrajectory,
    pub cost: f64,
    pub drivable: bool,
    pub mode: PlannerMode,
    pub collisions: CollisionReport,
}

/// State kept across planning cycles
#[derive(Debug, Clone, Default)]
pub struct PlannerSession {
    ego: Option<CarHandle>,
    cycles: usize,
}

impl PlannerSession {
    pub fn is_first_run(&self) -> bool {
        self.ego.is_none()
    }

    pub fn ego_handle(&self) -> Option<CarHandle> {
        self.ego
    }

    /// Cycles planned so far, standstill cycles included
    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

pub struct MiqpPlanner<E: DiscreteEngine = ReferenceFollowingEngine> {
    config: PlannerConfig,
    engine: E,
    session: PlannerSession,
    offset: MapOffset,
}

impl<E: DiscreteEngine> MiqpPlanner<E> {
    /// Validate `config` and create the engine from it
    pub fn new(config: PlannerConfig) -> PlanningResult<Self> {
        config.validate()?;
        let engine = E::create(config.engine_settings());
        Ok(Self::assemble(config, engine))
    }

    /// Use an engine that has already been created
    pub fn with_engine(config: PlannerConfig, engine: E) -> PlanningResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, engine))
    }

    fn assemble(config: PlannerConfig, engine: E) -> Self {
        let offset = MapOffset::new(config.planner.pts_offset_x, config.planner.pts_offset_y);
        info!(
            nr_steps = engine.horizon_len(),
            ts = engine.timestep(),
            collision_radius = engine.collision_radius(),
            "planner initialized"
        );
        Self {
            config,
            engine,
            session: PlannerSession::default(),
            offset,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session(&self) -> &PlannerSession {
        &self.session
    }

    pub fn map_offset(&self) -> MapOffset {
        self.offset
    }

    /// Plan one cycle
    pub fn plan(&mut self, request: &PlanningRequest) -> PlanningResult<PlanningOutput> {
        let cycle_start = Instant::now();
        Self::validate_request(request)?;
        let init_point = &request.init_point;

        let stop_dist = match request.stop_distance {
            Some(distance) => distance,
            None => remaining_distance(&request.reference_line, init_point.position()).ok_or_else(|| {
                PlanningError::InvalidInput("cannot project the init point onto the reference line".to_string())
            })?,
        };
        let mode = determine_planner_mode(init_point.v, stop_dist, &ModeThresholds::from(&self.config.planner));
        self.session.cycles += 1;
        info!(cycle = self.session.cycles, %mode, v = init_point.v, stop_dist, "planning cycle");

        if mode == PlannerMode::Standstill {
            return Ok(PlanningOutput {
                trajectory: self.standstill_trajectory(init_point),
                cost: 0.0,
                drivable: true,
                mode,
                collisions: CollisionReport::default(),
            });
        }

        let reference = self.discretize_reference(request, stop_dist);
        if self.config.planner.use_environment_polygon {
            self.update_environment(request.road_boundaries.as_ref());
        }

        let state = SecondOrderState::from_trajectory_point(init_point, self.offset);
        let motion = desired_motion(mode, stop_dist, &self.config.planner);
        let ego = self.update_ego(state, reference, motion, request.timestamp)?;

        if self.config.planner.consider_obstacles {
            let obstacles_start = Instant::now();
            self.register_obstacles(&request.obstacles, init_point.relative_time)?;
            debug!(elapsed = ?obstacles_start.elapsed(), "obstacles registered");
        }

        let trajectory = self.engine_trajectory(mode, ego, init_point.relative_time, request.timestamp)?;
        self.check_valid_points(&trajectory)?;

        let collisions = self.check_collisions(&trajectory, request);
        if collisions.has_collision() && self.config.planner.reject_on_collision {
            return Err(PlanningError::EngineSolveFailure(format!(
                "planned trajectory collides ({} obstacle, {} environment)",
                collisions.obstacles.len(),
                collisions.environment.len()
            )));
        }

        let trajectory = if self.config.planner.use_smoothing {
            let smoothing_start = Instant::now();
            let smoothed = smooth_trajectory(
                &trajectory,
                init_point,
                self.config.planner.smoothing_subsampling,
                &self.config.smoother,
                &self.config.smoother_solver,
            )?;
            info!(points = smoothed.len(), elapsed = ?smoothing_start.elapsed(), "trajectory smoothed");
            smoothed
        } else {
            trajectory
        };

        info!(%mode, points = trajectory.len(), elapsed = ?cycle_start.elapsed(), "planning cycle done");
        Ok(PlanningOutput {
            trajectory,
            cost: 0.0,
            drivable: true,
            mode,
            collisions,
        })
    }

    fn validate_request(request: &PlanningRequest) -> PlanningResult<()> {
        if request.reference_line.len() < 2 {
            return Err(PlanningError::InvalidInput(format!(
                "reference line needs at least two points, got {}",
                request.reference_line.len()
            )));
        }
        let init = &request.init_point;
        if ![init.x(), init.y(), init.theta(), init.kappa(), init.v, init.a]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(PlanningError::InvalidInput("init point is not finite".to_string()));
        }
        Ok(())
    }

    /// Horizon of identical poses at rest
    fn standstill_trajectory(&self, init_point: &TrajectoryPoint) -> DiscretizedTrajectory {
        let nr_steps = self.config.engine.nr_steps;
        let ts = self.config.engine.ts;
        let points = (0..nr_steps)
            .map(|i| {
                let mut path_point = init_point.path_point;
                path_point.s = 0.0;
                path_point.dkappa = 0.0;
                TrajectoryPoint::new(path_point, 0.0, 0.0, init_point.relative_time + i as f64 * ts)
            })
            .collect();
        info!(points = nr_steps, "standstill, engine skipped");
        DiscretizedTrajectory::from_points(points)
    }

    /// Reference polyline in engine coordinates, cut behind the stop point
    fn discretize_reference(&self, request: &PlanningRequest, stop_dist: f64) -> Vec<Point2D> {
        let ego_s = station(&request.reference_line, request.init_point.position()).unwrap_or(0.0);
        let max_s = ego_s + stop_dist + self.config.planner.cutoff_distance_reference_after_stop;
        let cut = cut_reference_line(&request.reference_line, max_s);
        debug!(points = cut.len(), max_s, "reference line discretized");
        to_engine_reference(&cut, self.offset)
    }

    fn update_environment(&mut self, boundaries: Option<&RoadBoundaries>) {
        match boundaries {
            Some(boundaries) if boundaries.is_valid() => {
                let polygon: Vec<_> = boundaries
                    .to_polygon()
                    .into_iter()
                    .map(|p| self.offset.to_engine(p))
                    .collect();
                debug!(vertices = polygon.len(), "map polygon sent to engine");
                self.engine.update_map(&polygon);
            }
            _ => warn!("no usable road boundaries, map not updated"),
        }
    }

    fn update_ego(
        &mut self,
        state: SecondOrderState,
        reference: Vec<Point2D>,
        motion: DesiredMotion,
        timestamp: f64,
    ) -> PlanningResult<CarHandle> {
        match self.session.ego {
            None => {
                let handle = self.engine.add_car(CarSpec {
                    initial_state: state,
                    reference,
                    desired_velocity: motion.velocity,
                    desired_offset: motion.offset,
                    timestamp,
                    track_reference_position: motion.track_reference_position,
                });
                info!(handle = handle.0, "ego car added to engine");
                self.session.ego = Some(handle);
                Ok(handle)
            }
            Some(handle) => {
                let update = CarUpdate {
                    initial_state: state,
                    reference,
                    timestamp,
                    track_reference_position: motion.track_reference_position,
                };
                if !self.engine.update_car(handle, update)
                    || !self.engine.update_desired_velocity(handle, motion.velocity, motion.offset)
                {
                    return Err(PlanningError::EngineSolveFailure(format!(
                        "engine does not know ego handle {}",
                        handle.0
                    )));
                }
                debug!(
                    handle = handle.0,
                    velocity = motion.velocity,
                    offset = motion.offset,
                    "ego car updated"
                );
                Ok(handle)
            }
        }
    }

    fn register_obstacles(&mut self, obstacles: &[Obstacle], start_time: f64) -> PlanningResult<()> {
        self.engine.remove_all_obstacles();
        let horizon = self.engine.horizon_len();
        let radius = self.engine.collision_radius();
        let delta = self.offset.engine_delta();

        let statics = process_static_obstacles(obstacles, &self.config.obstacles, horizon, radius)?;
        let dynamics = process_dynamic_obstacles(
            obstacles,
            &self.config.obstacles,
            horizon,
            self.engine.timestep(),
            start_time,
            radius,
        )?;

        for processed in statics.iter().chain(dynamics.iter()) {
            self.add_obstacle(processed, delta)?;
        }
        info!(
            statics = statics.len(),
            dynamics = dynamics.len(),
            "obstacles handed to engine"
        );
        Ok(())
    }

    fn add_obstacle(&mut self, processed: &ProcessedObstacle, delta: Point2D) -> PlanningResult<()> {
        let inflated = processed.inflated.translated(delta);
        match self
            .engine
            .add_obstacle(&inflated, processed.is_static, processed.is_soft)
        {
            Some(handle) => {
                debug!(
                    ids = ?processed.ids,
                    handle = handle.0,
                    is_static = processed.is_static,
                    is_soft = processed.is_soft,
                    "obstacle added"
                );
                Ok(())
            }
            None => Err(PlanningError::ObstacleProcessingFailure(format!(
                "engine rejected obstacle {:?}",
                processed.ids
            ))),
        }
    }

    fn engine_trajectory(
        &mut self,
        mode: PlannerMode,
        ego: CarHandle,
        time_offset: f64,
        timestamp: f64,
    ) -> PlanningResult<DiscretizedTrajectory> {
        let min_speed = self.config.planner.minimum_valid_speed_vx_vy;
        if mode.uses_reference_trajectory() {
            let raw = self.engine.last_reference_trajectory(ego, time_offset).ok_or_else(|| {
                PlanningError::EngineSolveFailure("engine has no reference trajectory".to_string())
            })?;
            debug!(records = raw.records(), "using engine reference trajectory");
            return Ok(raw.to_discretized_trajectory(self.offset, false, min_speed));
        }

        let solve_start = Instant::now();
        let solved = self.engine.solve(timestamp);
        info!(solved, elapsed = ?solve_start.elapsed(), "engine solve");
        if !solved {
            error!("engine could not find a solution");
            return Err(PlanningError::EngineSolveFailure("engine solve returned no solution".to_string()));
        }
        let raw: RawTrajectory = self.engine.solution_trajectory(ego, time_offset).ok_or_else(|| {
            PlanningError::EngineSolveFailure("engine has no solution for the ego car".to_string())
        })?;
        Ok(raw.to_discretized_trajectory(self.offset, true, min_speed))
    }

    fn check_valid_points(&self, trajectory: &DiscretizedTrajectory) -> PlanningResult<()> {
        let required = self.config.planner.minimum_percentage_valid_points * self.config.engine.nr_steps as f64;
        if (trajectory.len() as f64) < required {
            error!(valid = trajectory.len(), required, "too few valid engine points");
            return Err(PlanningError::InsufficientValidPoints {
                valid: trajectory.len(),
                required: required.ceil() as usize,
            });
        }
        Ok(())
    }

    fn check_collisions(&self, trajectory: &DiscretizedTrajectory, request: &PlanningRequest) -> CollisionReport {
        let vehicle = &self.config.vehicle;
        let mut report = CollisionReport::default();
        if self.config.planner.consider_obstacles {
            report.obstacles = check_obstacle_collisions(trajectory, &request.obstacles, vehicle);
            for collision in &report.obstacles {
                error!(
                    obstacle = %collision.obstacle_id,
                    t = collision.relative_time,
                    "planned trajectory collides with obstacle"
                );
            }
        }
        if self.config.planner.use_environment_polygon {
            if let Some(boundaries) = request.road_boundaries.as_ref().filter(|b| b.is_valid()) {
                report.environment = check_environment_collisions(trajectory, &boundaries.to_polygon(), vehicle);
                for t in &report.environment {
                    error!(t, "planned trajectory leaves the road");
                }
            }
        }
        report
    }
}
