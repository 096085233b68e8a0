//! Conversion of obstacles into the four-corner form the engine consumes
//!
//! Static obstacles are extended, merged when close to each other and repeated for
//! every horizon step. Dynamic obstacles are sampled along their prediction at the
//! engine timestep. Every polygon is expanded by the collision radius and replaced
//! by its minimum-area bounding box.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::obstacle::Obstacle;
use crate::common::{PlanningError, PlanningResult, Point2D};
use crate::geometry::Polygon2d;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Total longitudinal growth of static obstacle boxes [m]
    pub extension_length_static: f64,
    /// Total lateral growth of static obstacle boxes [m]
    pub extension_width_static: f64,
    /// Total longitudinal growth of dynamic obstacle boxes [m]
    pub extension_length_dynamic: f64,
    pub merge_static_obstacles: bool,
    /// Static polygons closer than this are merged [m]
    pub static_obstacle_distance_criteria: f64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            extension_length_static: 0.0,
            extension_width_static: 0.0,
            extension_length_dynamic: 2.0,
            merge_static_obstacles: true,
            static_obstacle_distance_criteria: 2.0,
        }
    }
}

/// Obstacle footprint per horizon step, each one an inflated rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct InflatedObstacle {
    pub corners: Vec<[Point2D; 4]>,
}

impl InflatedObstacle {
    pub fn new(corners: Vec<[Point2D; 4]>) -> Self {
        Self { corners }
    }

    /// Horizon length covered
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    pub fn polygon_at(&self, step: usize) -> Option<Polygon2d> {
        self.corners
            .get(step)
            .map(|c| Polygon2d::from_convex_points(c.to_vec()))
    }

    /// Copy shifted by `delta`
    pub fn translated(&self, delta: Point2D) -> Self {
        let corners = self
            .corners
            .iter()
            .map(|c| [c[0] + delta, c[1] + delta, c[2] + delta, c[3] + delta])
            .collect();
        Self { corners }
    }
}

/// An inflated obstacle together with how the engine should treat it
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedObstacle {
    /// Ids of the source obstacles (several after merging)
    pub ids: Vec<String>,
    pub inflated: InflatedObstacle,
    pub is_static: bool,
    pub is_soft: bool,
}

/// Expand `polygon` by `radius` and reduce it to the corners of its minimum-area bounding box
pub fn inflate_to_corners(polygon: &Polygon2d, radius: f64) -> PlanningResult<[Point2D; 4]> {
    let expanded = polygon.expand_by_distance(radius).ok_or_else(|| {
        PlanningError::ObstacleProcessingFailure(format!(
            "could not expand polygon with {} points by {}",
            polygon.num_points(),
            radius
        ))
    })?;
    let bounding_box = expanded.min_area_bounding_box();
    if bounding_box.area() <= 0.0 {
        return Err(PlanningError::ObstacleProcessingFailure(
            "degenerate obstacle bounding box".to_string(),
        ));
    }
    Ok(bounding_box.corners())
}

/// Extended footprints of the non-virtual static obstacles, merged by convex hull
/// when closer than the merge distance
pub fn merge_static_polygons(obstacles: &[Obstacle], config: &ObstacleConfig) -> Vec<(Vec<String>, Polygon2d)> {
    let mut polygons: Vec<(Vec<String>, Polygon2d)> = Vec::new();
    for obstacle in obstacles.iter().filter(|o| !o.is_virtual && !o.has_trajectory()) {
        let mut footprint = obstacle.perception_box;
        footprint.longitudinal_extend(config.extension_length_static);
        footprint.lateral_extend(config.extension_width_static);
        let polygon = footprint.to_polygon();

        let close = if config.merge_static_obstacles {
            polygons
                .iter_mut()
                .find(|(_, existing)| polygon.distance_to(existing) < config.static_obstacle_distance_criteria)
        } else {
            None
        };

        match close {
            Some((ids, existing)) => {
                let vertices: Vec<Point2D> = polygon
                    .points()
                    .iter()
                    .chain(existing.points().iter())
                    .copied()
                    .collect();
                if let Some(hull) = Polygon2d::convex_hull(&vertices) {
                    info!(id = %obstacle.id, "merging static obstacle into existing polygon");
                    *existing = hull;
                    ids.push(obstacle.id.clone());
                }
            }
            None => {
                info!(id = %obstacle.id, "adding static obstacle polygon");
                polygons.push((vec![obstacle.id.clone()], polygon));
            }
        }
    }
    polygons
}

/// Static obstacles for a horizon of `horizon_len` steps
///
/// They are soft as soon as they are extended in either direction.
pub fn process_static_obstacles(
    obstacles: &[Obstacle],
    config: &ObstacleConfig,
    horizon_len: usize,
    collision_radius: f64,
) -> PlanningResult<Vec<ProcessedObstacle>> {
    let is_soft = config.extension_length_static > 0.0 || config.extension_width_static > 0.0;
    merge_static_polygons(obstacles, config)
        .into_iter()
        .map(|(ids, polygon)| {
            let corners = inflate_to_corners(&polygon, collision_radius)?;
            Ok(ProcessedObstacle {
                ids,
                inflated: InflatedObstacle::new(vec![corners; horizon_len]),
                is_static: true,
                is_soft,
            })
        })
        .collect()
}

/// Dynamic obstacles sampled at `start_time + i * timestep`; always soft
pub fn process_dynamic_obstacles(
    obstacles: &[Obstacle],
    config: &ObstacleConfig,
    horizon_len: usize,
    timestep: f64,
    start_time: f64,
    collision_radius: f64,
) -> PlanningResult<Vec<ProcessedObstacle>> {
    let mut processed = Vec::new();
    for obstacle in obstacles.iter().filter(|o| !o.is_virtual && o.has_trajectory()) {
        let corners = (0..horizon_len)
            .map(|i| {
                let prediction_time = start_time + i as f64 * timestep;
                let mut footprint = obstacle.box_at_time(prediction_time);
                footprint.longitudinal_extend(config.extension_length_dynamic);
                inflate_to_corners(&footprint.to_polygon(), collision_radius)
            })
            .collect::<PlanningResult<Vec<_>>>()?;
        debug!(id = %obstacle.id, steps = corners.len(), "sampled dynamic obstacle");
        processed.push(ProcessedObstacle {
            ids: vec![obstacle.id.clone()],
            inflated: InflatedObstacle::new(corners),
            is_static: false,
            is_soft: true,
        });
    }
    Ok(processed)
}
