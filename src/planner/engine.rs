//! Interface of the discrete trajectory engine
//!
//! The engine plans the coarse horizon for one or more cars among obstacles. Cars
//! and obstacles live in engine-owned storage and are referred to by handles.

pub use crate::obstacles::InflatedObstacle;
use crate::common::{Point2D, TrajectoryPoint};

use super::config::EngineSettings;
use super::wire::{MapOffset, RawTrajectory};

/// Speed floor of the engine's initial state [m/s]
pub const MIN_INITIAL_SPEED: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CarHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObstacleHandle(pub usize);

/// Point-mass state `[x, vx, ax, y, vy, ay]` in engine coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SecondOrderState {
    pub x: f64,
    pub vx: f64,
    pub ax: f64,
    pub y: f64,
    pub vy: f64,
    pub ay: f64,
}

impl SecondOrderState {
    /// Engine state of a planning init point
    ///
    /// The speed is floored at [`MIN_INITIAL_SPEED`] so the heading stays defined,
    /// and the lateral acceleration follows from the curvature.
    pub fn from_trajectory_point(point: &TrajectoryPoint, offset: MapOffset) -> Self {
        let v = point.v.max(MIN_INITIAL_SPEED);
        let (sin, cos) = point.theta().sin_cos();
        let centripetal = v * v * point.kappa();
        let position = offset.to_engine(point.position());
        Self {
            x: position.x,
            vx: v * cos,
            ax: point.a * cos - centripetal * sin,
            y: position.y,
            vy: v * sin,
            ay: point.a * sin + centripetal * cos,
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.vx, self.ax, self.y, self.vy, self.ay]
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Car registration
#[derive(Debug, Clone, PartialEq)]
pub struct CarSpec {
    pub initial_state: SecondOrderState,
    /// Reference polyline in engine coordinates
    pub reference: Vec<Point2D>,
    pub desired_velocity: f64,
    /// Desired travel along the reference when not tracking it [m]
    pub desired_offset: f64,
    pub timestamp: f64,
    pub track_reference_position: bool,
}

/// Per-cycle car update
#[derive(Debug, Clone, PartialEq)]
pub struct CarUpdate {
    pub initial_state: SecondOrderState,
    pub reference: Vec<Point2D>,
    pub timestamp: f64,
    pub track_reference_position: bool,
}

/// Discrete trajectory engine
///
/// Dropping the engine releases everything it owns.
pub trait DiscreteEngine {
    fn create(settings: EngineSettings) -> Self
    where
        Self: Sized;

    fn horizon_len(&self) -> usize;

    fn timestep(&self) -> f64;

    fn collision_radius(&self) -> f64;

    fn add_car(&mut self, car: CarSpec) -> CarHandle;

    /// Returns false for an unknown handle
    fn update_car(&mut self, handle: CarHandle, update: CarUpdate) -> bool;

    /// Returns false for an unknown handle
    fn update_desired_velocity(&mut self, handle: CarHandle, velocity: f64, offset: f64) -> bool;

    /// Drivable area as a closed polygon in engine coordinates
    fn update_map(&mut self, polygon: &[Point2D]);

    fn remove_all_obstacles(&mut self);

    /// `None` when the obstacle cannot be stored
    fn add_obstacle(
        &mut self,
        obstacle: &InflatedObstacle,
        is_static: bool,
        is_soft: bool,
    ) -> Option<ObstacleHandle>;

    fn solve(&mut self, timestamp: f64) -> bool;

    /// Result of the last successful solve, timed from `time_offset`
    fn solution_trajectory(&self, handle: CarHandle, time_offset: f64) -> Option<RawTrajectory>;

    /// Reference trajectory the engine derived from the car's last update
    fn last_reference_trajectory(&self, handle: CarHandle, time_offset: f64) -> Option<RawTrajectory>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PathPoint;

    #[test]
    fn test_second_order_state_straight() {
        let point = TrajectoryPoint::new(PathPoint::new(105.0, 52.0, 0.0), 5.0, 1.0, 0.0);
        let state = SecondOrderState::from_trajectory_point(&point, MapOffset::new(100.0, 50.0));
        assert_eq!(state.to_array(), [5.0, 5.0, 1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_second_order_state_speed_floor() {
        let point = TrajectoryPoint::new(PathPoint::new(0.0, 0.0, std::f64::consts::FRAC_PI_2), 0.0, 0.0, 0.0);
        let state = SecondOrderState::from_trajectory_point(&point, MapOffset::default());
        assert!((state.speed() - MIN_INITIAL_SPEED).abs() < 1e-12);
        assert!(state.vx.abs() < 1e-12);
        assert!((state.vy - MIN_INITIAL_SPEED).abs() < 1e-12);
    }

    #[test]
    fn test_second_order_state_centripetal() {
        let mut path_point = PathPoint::new(0.0, 0.0, 0.0);
        path_point.kappa = 0.1;
        let point = TrajectoryPoint::new(path_point, 4.0, 0.0, 0.0);
        let state = SecondOrderState::from_trajectory_point(&point, MapOffset::default());
        assert!(state.ax.abs() < 1e-12);
        assert!((state.ay - 1.6).abs() < 1e-12);
    }
}
