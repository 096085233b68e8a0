//! Perceived obstacles and their predicted motion

use crate::common::{PathPoint, Point2D, TrajectoryPoint};
use crate::geometry::Box2d;

/// Obstacle as delivered by perception and prediction
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: String,
    /// Current footprint
    pub perception_box: Box2d,
    /// Virtual obstacles (stop lines, destination markers) never block the ego vehicle
    pub is_virtual: bool,
    /// Predicted trajectory; `None` for static obstacles
    pub prediction: Option<Vec<TrajectoryPoint>>,
}

impl Obstacle {
    pub fn new_static(id: impl Into<String>, perception_box: Box2d) -> Self {
        Self {
            id: id.into(),
            perception_box,
            is_virtual: false,
            prediction: None,
        }
    }

    pub fn new_dynamic(
        id: impl Into<String>,
        perception_box: Box2d,
        prediction: Vec<TrajectoryPoint>,
    ) -> Self {
        Self {
            id: id.into(),
            perception_box,
            is_virtual: false,
            prediction: Some(prediction),
        }
    }

    /// Obstacle moving in a straight line at constant speed, predicted over `horizon` seconds
    pub fn constant_velocity(
        id: impl Into<String>,
        perception_box: Box2d,
        velocity: Point2D,
        horizon: f64,
        dt: f64,
    ) -> Self {
        let heading = if velocity.norm() > f64::EPSILON {
            velocity.y.atan2(velocity.x)
        } else {
            perception_box.heading
        };
        let num_points = (horizon / dt).ceil().max(1.0) as usize + 1;
        let prediction = (0..num_points)
            .map(|i| {
                let t = i as f64 * dt;
                let position = perception_box.center + velocity * t;
                TrajectoryPoint::new(
                    PathPoint::new(position.x, position.y, heading),
                    velocity.norm(),
                    0.0,
                    t,
                )
            })
            .collect();
        Self::new_dynamic(id, perception_box, prediction)
    }

    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    pub fn has_trajectory(&self) -> bool {
        self.prediction.as_ref().map_or(false, |p| !p.is_empty())
    }

    /// Predicted state at `relative_time`, linearly interpolated between prediction
    /// points and held constant beyond both ends
    pub fn point_at_time(&self, relative_time: f64) -> Option<TrajectoryPoint> {
        let prediction = self.prediction.as_ref().filter(|p| !p.is_empty())?;
        let first = prediction[0];
        let last = prediction[prediction.len() - 1];
        if relative_time <= first.relative_time {
            return Some(first);
        }
        if relative_time >= last.relative_time {
            return Some(last);
        }

        let upper = prediction.partition_point(|p| p.relative_time < relative_time);
        let (p0, p1) = (prediction[upper - 1], prediction[upper]);
        let span = p1.relative_time - p0.relative_time;
        if span <= f64::EPSILON {
            return Some(p0);
        }
        let w = (relative_time - p0.relative_time) / span;
        let lerp = |a: f64, b: f64| a + w * (b - a);

        let mut path_point = PathPoint::new(
            lerp(p0.path_point.x, p1.path_point.x),
            lerp(p0.path_point.y, p1.path_point.y),
            p0.path_point.theta
                + w * crate::common::normalize_angle(p1.path_point.theta - p0.path_point.theta),
        );
        path_point.s = lerp(p0.path_point.s, p1.path_point.s);
        path_point.kappa = lerp(p0.path_point.kappa, p1.path_point.kappa);
        Some(TrajectoryPoint::new(
            path_point,
            lerp(p0.v, p1.v),
            lerp(p0.a, p1.a),
            relative_time,
        ))
    }

    /// Footprint placed at a predicted point
    pub fn bounding_box_at(&self, point: &TrajectoryPoint) -> Box2d {
        Box2d::new(
            point.position(),
            point.theta(),
            self.perception_box.length,
            self.perception_box.width,
        )
    }

    /// Footprint at `relative_time`; static obstacles keep their perception box
    pub fn box_at_time(&self, relative_time: f64) -> Box2d {
        match self.point_at_time(relative_time) {
            Some(point) => self.bounding_box_at(&point),
            None => self.perception_box,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving() -> Obstacle {
        Obstacle::constant_velocity(
            "car",
            Box2d::new(Point2D::new(10.0, 0.0), 0.0, 4.0, 2.0),
            Point2D::new(2.0, 0.0),
            5.0,
            1.0,
        )
    }

    #[test]
    fn test_static_obstacle() {
        let obstacle = Obstacle::new_static("box", Box2d::new(Point2D::origin(), 0.3, 2.0, 1.0));
        assert!(!obstacle.has_trajectory());
        assert!(obstacle.point_at_time(1.0).is_none());
        assert_eq!(obstacle.box_at_time(3.0), obstacle.perception_box);
    }

    #[test]
    fn test_interpolated_point() {
        let obstacle = moving();
        assert!(obstacle.has_trajectory());
        let point = obstacle.point_at_time(2.5).unwrap();
        assert!((point.x() - 15.0).abs() < 1e-12);
        assert!((point.relative_time - 2.5).abs() < 1e-12);
        assert!((point.v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_is_held_beyond_its_ends() {
        let obstacle = moving();
        assert!((obstacle.point_at_time(-1.0).unwrap().x() - 10.0).abs() < 1e-12);
        assert!((obstacle.point_at_time(50.0).unwrap().x() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_box_follows_prediction() {
        let obstacle = moving();
        let b = obstacle.box_at_time(1.0);
        assert!((b.center.x - 12.0).abs() < 1e-12);
        assert_eq!(b.length, 4.0);
        assert_eq!(b.width, 2.0);
    }
}
