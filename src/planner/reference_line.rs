//! Reference line and road boundary utilities

use itertools::Itertools;

use crate::common::{PathPoint, PlanningError, PlanningResult, Point2D};
use crate::geometry::CubicSpline2D;

use super::wire::MapOffset;

/// Left and right road boundaries, both ordered in driving direction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadBoundaries {
    pub left: Vec<Point2D>,
    pub right: Vec<Point2D>,
}

impl RoadBoundaries {
    pub fn new(left: Vec<Point2D>, right: Vec<Point2D>) -> Self {
        Self { left, right }
    }

    /// Closed polygon: the left boundary forward, then the right one backward
    pub fn to_polygon(&self) -> Vec<Point2D> {
        self.left
            .iter()
            .chain(self.right.iter().rev())
            .copied()
            .collect()
    }

    /// Whether both sides carry enough points to enclose an area
    pub fn is_valid(&self) -> bool {
        self.left.len() >= 2 && self.right.len() >= 2
    }
}

/// Projection of a point onto a polyline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Arc length of the foot point from the first vertex
    pub s: f64,
    /// Signed distance, positive to the left of the driving direction
    pub lateral: f64,
    /// Index of the segment holding the foot point
    pub segment: usize,
}

/// Cumulative arc length at every vertex
pub fn accumulated_s(points: &[Point2D]) -> Vec<f64> {
    let mut s = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += points[i - 1].distance(p);
        }
        s.push(total);
    }
    s
}

pub fn polyline_length(points: &[Point2D]) -> f64 {
    points.iter().tuple_windows().map(|(a, b)| a.distance(b)).sum()
}

/// Closest point of the polyline to `point`
///
/// Returns `None` for fewer than two vertices.
pub fn project_onto_polyline(points: &[Point2D], point: Point2D) -> Option<Projection> {
    if points.len() < 2 {
        return None;
    }
    let mut best: Option<(f64, Projection)> = None;
    let mut s_start = 0.0;
    for (segment, (a, b)) in points.iter().tuple_windows().enumerate() {
        let ab = *b - *a;
        let length = ab.norm();
        if length < f64::EPSILON {
            continue;
        }
        let t = ((point - *a).dot(&ab) / (length * length)).clamp(0.0, 1.0);
        let foot = *a + ab * t;
        let distance = point.distance(&foot);
        if best.map_or(true, |(d, _)| distance < d) {
            let side = if ab.cross(&(point - *a)) >= 0.0 { 1.0 } else { -1.0 };
            best = Some((
                distance,
                Projection {
                    s: s_start + t * length,
                    lateral: side * distance,
                    segment,
                },
            ));
        }
        s_start += length;
    }
    best.map(|(_, projection)| projection)
}

/// Position and heading at arc length `s`, extrapolated along the end segments
/// outside `[0, length]`
pub fn interpolate_polyline(points: &[Point2D], s: f64) -> Option<(Point2D, f64)> {
    if points.len() < 2 {
        return None;
    }
    let mut s_start = 0.0;
    let last_segment = points.len() - 2;
    for (i, (a, b)) in points.iter().tuple_windows().enumerate() {
        let length = a.distance(b);
        if length < f64::EPSILON && i < last_segment {
            continue;
        }
        if s <= s_start + length || i == last_segment {
            let direction = if length < f64::EPSILON {
                Point2D::new(1.0, 0.0)
            } else {
                (*b - *a) * (1.0 / length)
            };
            let local = if i == 0 { s - s_start } else { (s - s_start).max(0.0) };
            return Some((*a + direction * local, direction.y.atan2(direction.x)));
        }
        s_start += length;
    }
    None
}

/// Arc length of the projection of `position` onto the reference
pub fn station(reference: &[PathPoint], position: Point2D) -> Option<f64> {
    project_onto_polyline(&positions(reference), position).map(|p| p.s)
}

/// Distance left on the reference ahead of the projection of `position`
pub fn remaining_distance(reference: &[PathPoint], position: Point2D) -> Option<f64> {
    let points = positions(reference);
    let projection = project_onto_polyline(&points, position)?;
    Some((polyline_length(&points) - projection.s).max(0.0))
}

/// Keep the reference up to `max_s` of arc length from its first point
///
/// The first point beyond `max_s` is kept as well, so the line always reaches it.
pub fn cut_reference_line(reference: &[PathPoint], max_s: f64) -> Vec<PathPoint> {
    let points = positions(reference);
    let s = accumulated_s(&points);
    let end = s
        .iter()
        .position(|&si| si >= max_s)
        .map_or(reference.len(), |i| i + 1);
    reference[..end.max(2.min(reference.len()))].to_vec()
}

/// Reference line through `waypoints`, sampled every `ds` along a cubic spline
pub fn reference_from_waypoints(waypoints: &[Point2D], ds: f64) -> PlanningResult<Vec<PathPoint>> {
    if !(ds > 0.0) {
        return Err(PlanningError::InvalidInput(format!("sampling step must be positive, got {}", ds)));
    }
    let x: Vec<f64> = waypoints.iter().map(|p| p.x).collect();
    let y: Vec<f64> = waypoints.iter().map(|p| p.y).collect();
    let spline = CubicSpline2D::new(&x, &y).ok_or_else(|| {
        PlanningError::InvalidInput(format!(
            "cannot fit a spline through {} waypoints",
            waypoints.len()
        ))
    })?;

    let num_samples = (spline.length() / ds).floor() as usize + 1;
    Ok((0..num_samples)
        .map(|i| {
            let s = i as f64 * ds;
            let (px, py) = spline.position(s);
            let mut point = PathPoint::new(px, py, spline.yaw(s));
            point.s = s;
            point.kappa = spline.curvature(s);
            point
        })
        .collect())
}

/// Reference polyline in engine coordinates
pub fn to_engine_reference(reference: &[PathPoint], offset: MapOffset) -> Vec<Point2D> {
    reference
        .iter()
        .map(|p| offset.to_engine(p.position()))
        .collect()
}

fn positions(reference: &[PathPoint]) -> Vec<Point2D> {
    reference.iter().map(|p| p.position()).collect()
}
