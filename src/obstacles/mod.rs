//! Obstacle representation and preprocessing for the discrete engine

pub mod obstacle;
pub mod preprocessing;

pub use obstacle::Obstacle;
pub use preprocessing::{
    inflate_to_corners, merge_static_polygons, process_dynamic_obstacles, process_static_obstacles,
    InflatedObstacle, ObstacleConfig, ProcessedObstacle,
};
