//! Collision checks of a planned trajectory against obstacles and the road
//!
//! The checks run after a successful solve and only report; the planner decides
//! whether a reported collision rejects the trajectory.

use crate::common::{DiscretizedTrajectory, Point2D, TrajectoryPoint};
use crate::geometry::{point_in_polygon, Box2d};
use crate::obstacles::Obstacle;

use super::config::VehicleConfig;

/// Ego footprint overlapping an obstacle
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleCollision {
    pub obstacle_id: String,
    pub relative_time: f64,
}

/// Findings of the post-solve checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    pub obstacles: Vec<ObstacleCollision>,
    /// Relative times at which the footprint leaves the road polygon
    pub environment: Vec<f64>,
}

impl CollisionReport {
    pub fn has_collision(&self) -> bool {
        !self.obstacles.is_empty() || !self.environment.is_empty()
    }
}

/// Footprint of the ego vehicle at a trajectory point
pub fn ego_box(point: &TrajectoryPoint, vehicle: &VehicleConfig) -> Box2d {
    let shift = vehicle.length / 2.0 - vehicle.back_edge_to_center;
    let center = point.position() + Point2D::from_heading(point.theta()) * shift;
    Box2d::new(center, point.theta(), vehicle.length, vehicle.width)
}

/// Every (obstacle, point) pair where the ego footprint overlaps the obstacle's box at
/// the point's time; virtual obstacles are skipped
pub fn check_obstacle_collisions(
    trajectory: &DiscretizedTrajectory,
    obstacles: &[Obstacle],
    vehicle: &VehicleConfig,
) -> Vec<ObstacleCollision> {
    let mut collisions = Vec::new();
    for point in trajectory.iter() {
        let ego = ego_box(point, vehicle);
        for obstacle in obstacles.iter().filter(|o| !o.is_virtual) {
            if ego.has_overlap(&obstacle.box_at_time(point.relative_time)) {
                collisions.push(ObstacleCollision {
                    obstacle_id: obstacle.id.clone(),
                    relative_time: point.relative_time,
                });
            }
        }
    }
    collisions
}

/// Relative times at which a footprint corner lies outside `road_polygon`
pub fn check_environment_collisions(
    trajectory: &DiscretizedTrajectory,
    road_polygon: &[Point2D],
    vehicle: &VehicleConfig,
) -> Vec<f64> {
    if road_polygon.len() < 3 {
        return Vec::new();
    }
    trajectory
        .iter()
        .filter(|point| {
            ego_box(point, vehicle)
                .corners()
                .iter()
                .any(|corner| !point_in_polygon(corner, road_polygon))
        })
        .map(|point| point.relative_time)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PathPoint;

    fn straight_trajectory(v: f64, n: usize) -> DiscretizedTrajectory {
        DiscretizedTrajectory::from_points(
            (0..n)
                .map(|i| {
                    let t = i as f64 * 0.25;
                    TrajectoryPoint::new(PathPoint::new(v * t, 0.0, 0.0), v, 0.0, t)
                })
                .collect(),
        )
    }

    #[test]
    fn test_ego_box_is_shifted_forward() {
        let vehicle = VehicleConfig::default();
        let point = TrajectoryPoint::new(PathPoint::new(0.0, 0.0, 0.0), 0.0, 0.0, 0.0);
        let footprint = ego_box(&point, &vehicle);
        let rear = footprint.center.x - vehicle.length / 2.0;
        assert!((rear + vehicle.back_edge_to_center).abs() < 1e-12);
    }

    #[test]
    fn test_static_obstacle_on_path() {
        let trajectory = straight_trajectory(4.0, 20);
        let obstacles = vec![
            Obstacle::new_static("blocker", Box2d::new(Point2D::new(10.0, 0.0), 0.0, 2.0, 2.0)),
            Obstacle::new_static("aside", Box2d::new(Point2D::new(10.0, 6.0), 0.0, 2.0, 2.0)),
            Obstacle::new_static("stop_line", Box2d::new(Point2D::new(15.0, 0.0), 0.0, 0.5, 4.0))
                .with_virtual(true),
        ];
        let collisions = check_obstacle_collisions(&trajectory, &obstacles, &VehicleConfig::default());
        assert!(!collisions.is_empty());
        assert!(collisions.iter().all(|c| c.obstacle_id == "blocker"));
    }

    #[test]
    fn test_dynamic_obstacle_moving_away() {
        let trajectory = straight_trajectory(4.0, 20);
        let leader = Obstacle::constant_velocity(
            "leader",
            Box2d::new(Point2D::new(12.0, 0.0), 0.0, 4.0, 2.0),
            Point2D::new(6.0, 0.0),
            6.0,
            0.25,
        );
        let collisions = check_obstacle_collisions(&trajectory, &[leader], &VehicleConfig::default());
        assert!(collisions.is_empty());
    }

    #[test]
    fn test_environment_check() {
        let trajectory = straight_trajectory(4.0, 10);
        let road = vec![
            Point2D::new(-5.0, 3.0),
            Point2D::new(-5.0, -3.0),
            Point2D::new(50.0, -3.0),
            Point2D::new(50.0, 3.0),
        ];
        let vehicle = VehicleConfig::default();
        assert!(check_environment_collisions(&trajectory, &road, &vehicle).is_empty());

        let narrow = vec![
            Point2D::new(-5.0, 0.5),
            Point2D::new(-5.0, -0.5),
            Point2D::new(50.0, -0.5),
            Point2D::new(50.0, 0.5),
        ];
        assert_eq!(check_environment_collisions(&trajectory, &narrow, &vehicle).len(), 10);
        assert!(check_environment_collisions(&trajectory, &narrow[..2], &vehicle).is_empty());
    }

    #[test]
    fn test_report() {
        let mut report = CollisionReport::default();
        assert!(!report.has_collision());
        report.environment.push(0.5);
        assert!(report.has_collision());
    }
}
