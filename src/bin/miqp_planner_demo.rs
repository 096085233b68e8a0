// Closed-loop planning demo: the ego vehicle follows a curved road past parked
// obstacles behind a leading car until it comes to rest at the end of the road.
//
// usage: miqp_planner_demo [config.toml]
// logging: RUST_LOG=rust_trajectory_planner=debug
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rust_trajectory_planner::common::{
    DiscretizedTrajectory, PathPoint, PlanningError, PlanningResult, Point2D, TrajectoryPoint,
};
use rust_trajectory_planner::geometry::Box2d;
use rust_trajectory_planner::obstacles::Obstacle;
use rust_trajectory_planner::planner::reference_line::{interpolate_polyline, reference_from_waypoints};
use rust_trajectory_planner::planner::{MiqpPlanner, PlannerConfig, PlannerMode, PlanningRequest, RoadBoundaries};
use rust_trajectory_planner::utils::{colors, PathStyle, Visualizer};

const CYCLE_TIME: f64 = 0.1;
const MAX_CYCLES: usize = 400;
const ROAD_HALF_WIDTH: f64 = 6.0;
const NUM_PARKED: usize = 4;
const LEADER_START_S: f64 = 35.0;
const LEADER_SPEED: f64 = 7.0;
const OUTPUT_PATH: &str = "img/miqp_planner_demo.png";

fn road_boundaries(reference: &[PathPoint]) -> RoadBoundaries {
    let side = |offset: f64| -> Vec<Point2D> {
        reference
            .iter()
            .map(|p| p.position() + Point2D::new(-p.theta.sin(), p.theta.cos()) * offset)
            .collect()
    };
    RoadBoundaries::new(side(ROAD_HALF_WIDTH), side(-ROAD_HALF_WIDTH))
}

/// Parked cars on the left shoulder at random stations
fn parked_obstacles(reference: &[PathPoint], rng: &mut StdRng) -> PlanningResult<Vec<Obstacle>> {
    let length = reference.last().map_or(0.0, |p| p.s);
    let heading_noise = Normal::new(0.0, 0.1).map_err(|e| PlanningError::InvalidInput(e.to_string()))?;
    Ok((0..NUM_PARKED)
        .filter_map(|i| {
            let s = rng.gen_range(15.0..length - 15.0);
            let point = reference.iter().find(|p| p.s >= s)?;
            let normal = Point2D::new(-point.theta.sin(), point.theta.cos());
            let center = point.position() + normal * rng.gen_range(4.3..4.8);
            let heading = point.theta + heading_noise.sample(&mut *rng);
            Some(Obstacle::new_static(format!("parked_{}", i), Box2d::new(center, heading, 4.5, 1.9)))
        })
        .collect())
}

/// Leading car driving along the reference at constant speed, predicted from `time`
fn leader(polyline: &[Point2D], time: f64, horizon: f64) -> Option<Obstacle> {
    let dt = 0.25;
    let prediction: Vec<TrajectoryPoint> = (0..=(horizon / dt) as usize)
        .map(|i| {
            let t = i as f64 * dt;
            let s = LEADER_START_S + LEADER_SPEED * (time + t);
            interpolate_polyline(polyline, s)
                .map(|(p, theta)| TrajectoryPoint::new(PathPoint::new(p.x, p.y, theta), LEADER_SPEED, 0.0, t))
        })
        .collect::<Option<_>>()?;
    let first = prediction.first()?;
    let footprint = Box2d::new(first.position(), first.theta(), 4.5, 1.9);
    Some(Obstacle::new_dynamic("leader", footprint, prediction))
}

/// State reached `dt` into the trajectory
fn advance(trajectory: &DiscretizedTrajectory, dt: f64) -> Option<TrajectoryPoint> {
    let start = trajectory.first()?.relative_time;
    let mut next = *trajectory
        .iter()
        .find(|p| p.relative_time >= start + dt - 1e-9)
        .or_else(|| trajectory.last())?;
    next.relative_time = 0.0;
    Some(next)
}

fn run() -> PlanningResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => PlannerConfig::from_file(path)?,
        None => PlannerConfig::default(),
    };
    let vehicle = config.vehicle.clone();
    let standstill_velocity = config.planner.standstill_velocity_threshold;
    let mut planner: MiqpPlanner = MiqpPlanner::new(config)?;

    let waypoints = [
        Point2D::new(0.0, 0.0),
        Point2D::new(30.0, 4.0),
        Point2D::new(60.0, 0.0),
        Point2D::new(90.0, -4.0),
        Point2D::new(120.0, 0.0),
    ];
    let reference = reference_from_waypoints(&waypoints, 0.5)?;
    let polyline: Vec<Point2D> = reference.iter().map(|p| p.position()).collect();
    let road = road_boundaries(&reference);
    let mut rng = StdRng::seed_from_u64(7);
    let parked = parked_obstacles(&reference, &mut rng)?;
    info!(points = reference.len(), parked = parked.len(), "scenario ready");

    let first = reference[0];
    let mut state = TrajectoryPoint::new(PathPoint::new(first.x, first.y, first.theta), 6.0, 0.0, 0.0);
    let mut driven = DiscretizedTrajectory::new();
    let mut last_plan = DiscretizedTrajectory::new();

    for cycle in 0..MAX_CYCLES {
        let time = cycle as f64 * CYCLE_TIME;
        let mut obstacles = parked.clone();
        obstacles.extend(leader(&polyline, time, 6.0));

        let request = PlanningRequest::new(state, reference.clone())
            .with_obstacles(obstacles)
            .with_road_boundaries(road.clone())
            .with_timestamp(time);
        let output = match planner.plan(&request) {
            Ok(output) => output,
            Err(err) => {
                warn!(cycle, kind = ?err.kind(), %err, "planning failed, keeping the last trajectory");
                if last_plan.is_empty() {
                    return Err(err);
                }
                state = advance(&last_plan, CYCLE_TIME).unwrap_or(state);
                continue;
            }
        };

        info!(
            cycle,
            mode = %output.mode,
            v = state.v,
            x = state.x(),
            y = state.y(),
            collisions = output.collisions.obstacles.len(),
            "cycle planned"
        );
        let mut driven_point = state;
        driven_point.relative_time = time;
        driven.push(driven_point);

        // Start also covers creeping up to the stop point, so rest is judged on speed
        let stopped = output.mode.uses_reference_trajectory() && state.v < standstill_velocity;
        if output.mode == PlannerMode::Standstill || stopped {
            info!(cycle, mode = %output.mode, "vehicle at rest");
            break;
        }
        state = advance(&output.trajectory, CYCLE_TIME).unwrap_or(state);
        last_plan = output.trajectory;
    }

    let mut vis = Visualizer::new();
    vis.set_title("MIQP planner demo");
    vis.plot_road(&road)
        .plot_reference_line(&reference)
        .plot_obstacles(&parked, 0.0)
        .plot_trajectory(&driven, &PathStyle::new(colors::ENGINE_TRAJECTORY, "Driven"))
        .plot_trajectory(&last_plan, &PathStyle::new(colors::SMOOTHED_TRAJECTORY, "Last plan"));
    if let Some(end) = driven.last() {
        vis.plot_ego(end, &vehicle);
    }
    std::fs::create_dir_all("img")?;
    match vis.save_png(OUTPUT_PATH, 1200, 500) {
        Ok(()) => info!(path = OUTPUT_PATH, "plot saved"),
        Err(err) => warn!(%err, "could not save plot"),
    }

    let mut speed = Visualizer::time_series("v [m/s]");
    speed
        .set_title("Driven speed")
        .plot_speed_profile(&driven, &PathStyle::new(colors::ENGINE_TRAJECTORY, "v"));
    if let Err(err) = speed.save_png("img/miqp_planner_demo_speed.png", 800, 400) {
        warn!(%err, "could not save speed plot");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        error!(kind = ?err.kind(), %err, "demo failed");
        std::process::exit(1);
    }
}
