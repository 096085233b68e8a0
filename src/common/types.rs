//! Common types used throughout rust_trajectory_planner

use itertools::Itertools;
use nalgebra::Vector2;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn dot(&self, other: &Point2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product
    pub fn cross(&self, other: &Point2D) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn from_heading(theta: f64) -> Point2D {
        Point2D::new(theta.cos(), theta.sin())
    }
}

impl std::ops::Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, k: f64) -> Point2D {
        Point2D::new(self.x * k, self.y * k)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// Geometric sample of a path
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    /// accumulated arc length [m]
    pub s: f64,
    /// heading [rad]
    pub theta: f64,
    /// curvature [1/m]
    pub kappa: f64,
    /// curvature rate w.r.t. time [1/(m s)]
    pub dkappa: f64,
}

impl PathPoint {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta,
            ..Default::default()
        }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// Path point plus the longitudinal motion along it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrajectoryPoint {
    pub path_point: PathPoint,
    /// velocity [m/s]
    pub v: f64,
    /// longitudinal acceleration [m/s^2]
    pub a: f64,
    /// jerk [m/s^3]
    pub da: f64,
    /// time relative to the start of the planning cycle [s]
    pub relative_time: f64,
}

impl TrajectoryPoint {
    pub fn new(path_point: PathPoint, v: f64, a: f64, relative_time: f64) -> Self {
        Self {
            path_point,
            v,
            a,
            da: 0.0,
            relative_time,
        }
    }

    pub fn position(&self) -> Point2D {
        self.path_point.position()
    }

    pub fn x(&self) -> f64 {
        self.path_point.x
    }

    pub fn y(&self) -> f64 {
        self.path_point.y
    }

    pub fn theta(&self) -> f64 {
        self.path_point.theta
    }

    pub fn kappa(&self) -> f64 {
        self.path_point.kappa
    }
}

/// Time-parameterized trajectory, ordered by relative time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscretizedTrajectory {
    pub points: Vec<TrajectoryPoint>,
}

impl DiscretizedTrajectory {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<TrajectoryPoint>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: TrajectoryPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&TrajectoryPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrajectoryPoint> {
        self.points.iter()
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x()).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y()).collect()
    }

    /// Rewrite `s` as the cumulative Euclidean distance between consecutive points.
    pub fn recompute_s(&mut self) {
        let mut s = 0.0;
        let mut last: Option<Point2D> = None;
        for point in self.points.iter_mut() {
            if let Some(prev) = last {
                s += prev.distance(&point.position());
            }
            point.path_point.s = s;
            last = Some(point.position());
        }
    }

    pub fn total_length(&self) -> f64 {
        self.points
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.position().distance(&b.position()))
            .sum()
    }

    pub fn is_time_monotonic(&self) -> bool {
        self.points
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.relative_time >= a.relative_time)
    }

    pub fn is_s_monotonic(&self) -> bool {
        self.points
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.path_point.s >= a.path_point.s)
    }

    /// Translate every point by `delta`; `s` is translation invariant.
    pub fn translate(&mut self, delta: Point2D) {
        for point in self.points.iter_mut() {
            point.path_point.x += delta.x;
            point.path_point.y += delta.y;
        }
    }

    /// Fill jerk and curvature rate by forward differences in time.
    /// The last point repeats the previous rate.
    pub fn fill_time_derivatives(&mut self) {
        let n = self.points.len();
        if n < 2 {
            if let Some(p) = self.points.first_mut() {
                p.da = 0.0;
                p.path_point.dkappa = 0.0;
            }
            return;
        }
        for i in 0..n - 1 {
            let dt = self.points[i + 1].relative_time - self.points[i].relative_time;
            let (da, dkappa) = if dt > f64::EPSILON {
                (
                    (self.points[i + 1].a - self.points[i].a) / dt,
                    (self.points[i + 1].kappa() - self.points[i].kappa()) / dt,
                )
            } else {
                (0.0, 0.0)
            };
            self.points[i].da = da;
            self.points[i].path_point.dkappa = dkappa;
        }
        self.points[n - 1].da = self.points[n - 2].da;
        self.points[n - 1].path_point.dkappa = self.points[n - 2].path_point.dkappa;
    }
}

impl std::ops::Index<usize> for DiscretizedTrajectory {
    type Output = TrajectoryPoint;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<'a> IntoIterator for &'a DiscretizedTrajectory {
    type Item = &'a TrajectoryPoint;
    type IntoIter = std::slice::Iter<'a, TrajectoryPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Normalize angle to [-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let mut a = angle;
    while a > std::f64::consts::PI {
        a -= 2.0 * std::f64::consts::PI;
    }
    while a < -std::f64::consts::PI {
        a += 2.0 * std::f64::consts::PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64, t: f64) -> TrajectoryPoint {
        TrajectoryPoint::new(PathPoint::new(x, y, 0.0), 1.0, 0.0, t)
    }

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_point2d_cross() {
        let a = Point2D::new(1.0, 0.0);
        let b = Point2D::new(0.0, 1.0);
        assert!((a.cross(&b) - 1.0).abs() < 1e-12);
        assert!((b.cross(&a) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_recompute_s_is_cumulative_distance() {
        let mut traj = DiscretizedTrajectory::from_points(vec![
            point(0.0, 0.0, 0.0),
            point(3.0, 4.0, 0.1),
            point(3.0, 4.0, 0.2),
            point(6.0, 8.0, 0.3),
        ]);
        traj.recompute_s();
        let s: Vec<f64> = traj.iter().map(|p| p.path_point.s).collect();
        assert_eq!(s, vec![0.0, 5.0, 5.0, 10.0]);
        assert!(traj.is_s_monotonic());
        assert!(traj.is_time_monotonic());
        assert!((traj.total_length() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_fill_time_derivatives() {
        let mut traj = DiscretizedTrajectory::from_points(vec![
            point(0.0, 0.0, 0.0),
            point(1.0, 0.0, 0.5),
            point(2.0, 0.0, 1.0),
        ]);
        traj.points[1].a = 1.0;
        traj.points[2].a = 1.5;
        traj.points[2].path_point.kappa = 0.1;
        traj.fill_time_derivatives();
        assert!((traj[0].da - 2.0).abs() < 1e-12);
        assert!((traj[1].da - 1.0).abs() < 1e-12);
        assert!((traj[1].path_point.dkappa - 0.2).abs() < 1e-12);
        assert!((traj[2].da - traj[1].da).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_angle() {
        use std::f64::consts::PI;
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-10);
        assert!((normalize_angle(-3.0 * PI) + PI).abs() < 1e-10);
        assert!(normalize_angle(0.5).abs() - 0.5 < 1e-12);
        assert!(normalize_angle(f64::NAN).is_nan());
        assert_eq!(normalize_angle(f64::INFINITY), f64::INFINITY);
    }
}
