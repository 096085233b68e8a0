//! Convex polygons: hull construction, distance, expansion and bounding boxes

use itertools::Itertools;
use ordered_float::OrderedFloat;
use std::f64::consts::PI;

use crate::common::Point2D;
use crate::geometry::Box2d;

/// Angular resolution of the arcs added around vertices when expanding [rad]
const EXPAND_MIN_ANGLE: f64 = 0.1;
const GEOMETRY_EPSILON: f64 = 1e-10;

/// Convex polygon with vertices in counter-clockwise order
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon2d {
    points: Vec<Point2D>,
}

impl Polygon2d {
    /// Wrap points that are already convex and counter-clockwise
    pub fn from_convex_points(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Andrew's monotone chain convex hull.
    ///
    /// Returns `None` when the points do not span an area.
    pub fn convex_hull(points: &[Point2D]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let mut pts: Vec<Point2D> = points.to_vec();
        pts.sort_by_key(|p| (OrderedFloat(p.x), OrderedFloat(p.y)));
        pts.dedup_by(|a, b| a.distance(b) < GEOMETRY_EPSILON);
        if pts.len() < 3 {
            return None;
        }

        let mut lower: Vec<Point2D> = Vec::with_capacity(pts.len());
        for p in &pts {
            while lower.len() >= 2 && turn(lower[lower.len() - 2], lower[lower.len() - 1], *p) <= 0.0 {
                lower.pop();
            }
            lower.push(*p);
        }
        let mut upper: Vec<Point2D> = Vec::with_capacity(pts.len());
        for p in pts.iter().rev() {
            while upper.len() >= 2 && turn(upper[upper.len() - 2], upper[upper.len() - 1], *p) <= 0.0 {
                upper.pop();
            }
            upper.push(*p);
        }
        lower.pop();
        upper.pop();
        let mut hull = lower;
        hull.extend(upper);
        if hull.len() < 3 {
            return None;
        }
        Some(Self { points: hull })
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Directed edges `(p_i, p_{i+1})`, closing back to the first vertex
    pub fn edges(&self) -> impl Iterator<Item = (Point2D, Point2D)> + '_ {
        self.points.iter().copied().circular_tuple_windows()
    }

    pub fn area(&self) -> f64 {
        0.5 * self.edges().map(|(a, b)| a.cross(&b)).sum::<f64>()
    }

    /// Vertex average
    pub fn centroid(&self) -> Point2D {
        let n = self.points.len().max(1) as f64;
        let sum = self
            .points
            .iter()
            .fold(Point2D::origin(), |acc, p| acc + *p);
        sum * (1.0 / n)
    }

    pub fn is_point_in(&self, point: &Point2D) -> bool {
        self.edges().all(|(a, b)| turn(a, b, *point) >= -GEOMETRY_EPSILON)
    }

    pub fn distance_to_point(&self, point: &Point2D) -> f64 {
        if self.is_point_in(point) {
            return 0.0;
        }
        self.edges()
            .map(|(a, b)| segment_distance(point, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Separating axis test for two convex polygons
    pub fn has_overlap(&self, other: &Polygon2d) -> bool {
        !(has_separating_axis(self, other) || has_separating_axis(other, self))
    }

    /// Euclidean distance between the polygons, zero when they overlap
    pub fn distance_to(&self, other: &Polygon2d) -> f64 {
        if self.has_overlap(other) {
            return 0.0;
        }
        let forward = other
            .points
            .iter()
            .map(|p| self.distance_to_point(p))
            .fold(f64::INFINITY, f64::min);
        let backward = self
            .points
            .iter()
            .map(|p| other.distance_to_point(p))
            .fold(f64::INFINITY, f64::min);
        forward.min(backward)
    }

    /// Minkowski-like expansion: each vertex is replaced by an arc of radius `distance`
    /// between the normals of its adjacent edges, followed by a convex hull.
    pub fn expand_by_distance(&self, distance: f64) -> Option<Polygon2d> {
        if distance <= 0.0 {
            return Some(self.clone());
        }
        let n = self.points.len();
        let mut expanded = Vec::with_capacity(n * 8);
        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let curr = self.points[i];
            let next = self.points[(i + 1) % n];
            let start_angle = outward_normal_angle(prev, curr);
            let mut end_angle = outward_normal_angle(curr, next);
            if end_angle < start_angle {
                end_angle += 2.0 * PI;
            }
            let num_steps = ((end_angle - start_angle) / EXPAND_MIN_ANGLE).ceil().max(1.0) as usize;
            for step in 0..=num_steps {
                let angle = start_angle + (end_angle - start_angle) * step as f64 / num_steps as f64;
                expanded.push(curr + Point2D::from_heading(angle) * distance);
            }
        }
        Polygon2d::convex_hull(&expanded)
    }

    /// Rotating-calipers minimum area rectangle over the hull edge directions
    pub fn min_area_bounding_box(&self) -> Box2d {
        let mut best: Option<(f64, Box2d)> = None;
        for (a, b) in self.edges() {
            let edge = b - a;
            let len = edge.norm();
            if len < GEOMETRY_EPSILON {
                continue;
            }
            let u = edge * (1.0 / len);
            let n = Point2D::new(-u.y, u.x);
            let (min_u, max_u) = self
                .points
                .iter()
                .map(|p| p.dot(&u))
                .minmax()
                .into_option()
                .unwrap_or((0.0, 0.0));
            let (min_n, max_n) = self
                .points
                .iter()
                .map(|p| p.dot(&n))
                .minmax()
                .into_option()
                .unwrap_or((0.0, 0.0));
            let area = (max_u - min_u) * (max_n - min_n);
            if best.as_ref().map_or(true, |(a, _)| area < *a) {
                let center = u * (0.5 * (min_u + max_u)) + n * (0.5 * (min_n + max_n));
                let heading = u.y.atan2(u.x);
                best = Some((area, Box2d::new(center, heading, max_u - min_u, max_n - min_n)));
            }
        }
        best.map(|(_, b)| b)
            .unwrap_or_else(|| Box2d::new(self.centroid(), 0.0, 0.0, 0.0))
    }

    pub fn translate(&mut self, delta: Point2D) {
        for p in self.points.iter_mut() {
            *p = *p + delta;
        }
    }
}

/// Signed area of the triangle `(a, b, c)`, positive for a left turn
fn turn(a: Point2D, b: Point2D, c: Point2D) -> f64 {
    (b - a).cross(&(c - a))
}

fn outward_normal_angle(a: Point2D, b: Point2D) -> f64 {
    let d = b - a;
    (-d.x).atan2(d.y)
}

fn has_separating_axis(reference: &Polygon2d, other: &Polygon2d) -> bool {
    reference.edges().any(|(a, b)| {
        other
            .points
            .iter()
            .all(|p| turn(a, b, *p) < -GEOMETRY_EPSILON)
    })
}

/// Distance from `p` to the segment `[a, b]`
pub fn segment_distance(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let ab = *b - *a;
    let len_sq = ab.dot(&ab);
    if len_sq < GEOMETRY_EPSILON {
        return p.distance(a);
    }
    let t = ((*p - *a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    p.distance(&(*a + ab * t))
}

/// Even-odd point test for arbitrary (possibly non-convex) simple polygons
pub fn point_in_polygon(point: &Point2D, vertices: &[Point2D]) -> bool {
    let mut inside = false;
    for (a, b) in vertices.iter().circular_tuple_windows() {
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
