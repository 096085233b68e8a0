//! Oriented rectangle used for vehicle footprints and obstacle boxes

use crate::common::Point2D;
use crate::geometry::Polygon2d;

/// Rectangle with a heading, described by its center and full extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2d {
    pub center: Point2D,
    /// orientation of the length axis [rad]
    pub heading: f64,
    pub length: f64,
    pub width: f64,
}

impl Box2d {
    pub fn new(center: Point2D, heading: f64, length: f64, width: f64) -> Self {
        Self {
            center,
            heading,
            length,
            width,
        }
    }

    pub fn half_length(&self) -> f64 {
        self.length * 0.5
    }

    pub fn half_width(&self) -> f64 {
        self.width * 0.5
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Corners in counter-clockwise order, starting front-right
    pub fn corners(&self) -> [Point2D; 4] {
        let u = Point2D::from_heading(self.heading) * self.half_length();
        let n = Point2D::new(-self.heading.sin(), self.heading.cos()) * self.half_width();
        [
            self.center + u - n,
            self.center + u + n,
            self.center - u + n,
            self.center - u - n,
        ]
    }

    /// Grow the box along its heading by `extension_length` in total
    pub fn longitudinal_extend(&mut self, extension_length: f64) {
        self.length += extension_length;
    }

    /// Grow the box across its heading by `extension_width` in total
    pub fn lateral_extend(&mut self, extension_width: f64) {
        self.width += extension_width;
    }

    pub fn shift(&mut self, delta: Point2D) {
        self.center = self.center + delta;
    }

    pub fn to_polygon(&self) -> Polygon2d {
        Polygon2d::from_convex_points(self.corners().to_vec())
    }

    pub fn has_overlap(&self, other: &Box2d) -> bool {
        self.to_polygon().has_overlap(&other.to_polygon())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_corners_axis_aligned() {
        let b = Box2d::new(Point2D::new(1.0, 2.0), 0.0, 4.0, 2.0);
        let c = b.corners();
        assert_eq!(c[0], Point2D::new(3.0, 1.0));
        assert_eq!(c[1], Point2D::new(3.0, 3.0));
        assert_eq!(c[2], Point2D::new(-1.0, 3.0));
        assert_eq!(c[3], Point2D::new(-1.0, 1.0));
    }

    #[test]
    fn test_corners_rotated() {
        let b = Box2d::new(Point2D::origin(), FRAC_PI_2, 4.0, 2.0);
        let c = b.corners();
        // front-right of a box pointing to +y
        assert!((c[0].x - 1.0).abs() < 1e-12);
        assert!((c[0].y - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_extend() {
        let mut b = Box2d::new(Point2D::origin(), 0.0, 4.0, 2.0);
        b.longitudinal_extend(1.0);
        b.lateral_extend(0.5);
        assert!((b.area() - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_box_overlap() {
        let a = Box2d::new(Point2D::origin(), 0.0, 4.0, 2.0);
        let b = Box2d::new(Point2D::new(3.0, 0.0), 0.3, 4.0, 2.0);
        let c = Box2d::new(Point2D::new(10.0, 0.0), 0.0, 4.0, 2.0);
        assert!(a.has_overlap(&b));
        assert!(!a.has_overlap(&c));
    }
}
