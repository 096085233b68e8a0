//! Planar geometry for obstacles, vehicle footprints, road polygons and reference curves

pub mod box2d;
pub mod polygon;
pub mod spline;

pub use box2d::Box2d;
pub use polygon::{point_in_polygon, segment_distance, Polygon2d};
pub use spline::{CubicSpline, CubicSpline2D};
