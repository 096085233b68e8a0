//! Flat record format of engine trajectories
//!
//! Each record is `[time, x, y, vx, vy, ax, ay]` in engine coordinates, i.e. with the
//! map offset subtracted.

use crate::common::{DiscretizedTrajectory, PathPoint, Point2D, TrajectoryPoint};

pub const TIME_IDX: usize = 0;
pub const X_IDX: usize = 1;
pub const Y_IDX: usize = 2;
pub const VX_IDX: usize = 3;
pub const VY_IDX: usize = 4;
pub const AX_IDX: usize = 5;
pub const AY_IDX: usize = 6;
pub const RECORD_WIDTH: usize = 7;

/// Squared speed below which curvature is reported as zero
const MIN_SPEED_SQUARED_FOR_CURVATURE: f64 = 1e-3;

/// Offset between map coordinates and engine coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MapOffset {
    pub x: f64,
    pub y: f64,
}

impl MapOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_engine(&self, point: Point2D) -> Point2D {
        Point2D::new(point.x - self.x, point.y - self.y)
    }

    pub fn to_map(&self, point: Point2D) -> Point2D {
        Point2D::new(point.x + self.x, point.y + self.y)
    }

    /// Translation from map to engine coordinates
    pub fn engine_delta(&self) -> Point2D {
        Point2D::new(-self.x, -self.y)
    }
}

/// Trajectory as delivered by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrajectory {
    pub data: Vec<f64>,
}

impl RawTrajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(records: usize) -> Self {
        Self {
            data: Vec::with_capacity(records * RECORD_WIDTH),
        }
    }

    /// Number of complete records
    pub fn records(&self) -> usize {
        self.data.len() / RECORD_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.records() == 0
    }

    pub fn record(&self, index: usize) -> Option<&[f64]> {
        let start = index * RECORD_WIDTH;
        self.data.get(start..start + RECORD_WIDTH)
    }

    pub fn push_record(&mut self, record: [f64; RECORD_WIDTH]) {
        self.data.extend_from_slice(&record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(RECORD_WIDTH)
    }

    /// Convert into map coordinates
    ///
    /// # Arguments
    /// * `offset` - added back to every position
    /// * `low_speed_cutoff` - stop at the first record whose `|vx|` and `|vy|` are both
    ///   at most `min_speed_vx_vy`, where the engine model is no longer valid
    /// * `min_speed_vx_vy` - threshold of the cut-off [m/s]
    pub fn to_discretized_trajectory(
        &self,
        offset: MapOffset,
        low_speed_cutoff: bool,
        min_speed_vx_vy: f64,
    ) -> DiscretizedTrajectory {
        let mut trajectory = DiscretizedTrajectory::new();
        let mut theta: f64 = 0.0;
        for record in self.iter() {
            let (vx, vy) = (record[VX_IDX], record[VY_IDX]);
            let (ax, ay) = (record[AX_IDX], record[AY_IDX]);
            if low_speed_cutoff && vx.abs() <= min_speed_vx_vy && vy.abs() <= min_speed_vx_vy {
                break;
            }

            let speed_squared = vx * vx + vy * vy;
            if speed_squared > f64::EPSILON {
                theta = vy.atan2(vx);
            }
            let v = speed_squared.sqrt();
            let a = ax * theta.cos() + ay * theta.sin();
            let kappa = if speed_squared < MIN_SPEED_SQUARED_FOR_CURVATURE {
                0.0
            } else {
                (vx * ay - ax * vy) / speed_squared.powf(1.5)
            };

            let position = offset.to_map(Point2D::new(record[X_IDX], record[Y_IDX]));
            let mut path_point = PathPoint::new(position.x, position.y, theta);
            path_point.kappa = kappa;
            trajectory.push(TrajectoryPoint::new(path_point, v, a, record[TIME_IDX]));
        }
        trajectory.recompute_s();
        trajectory.fill_time_derivatives();
        trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_record(t: f64, v: f64, radius: f64) -> [f64; RECORD_WIDTH] {
        // counter-clockwise around the origin
        let phi = v * t / radius;
        let theta = phi + std::f64::consts::FRAC_PI_2;
        let centripetal = v * v / radius;
        [
            t,
            radius * phi.cos(),
            radius * phi.sin(),
            v * theta.cos(),
            v * theta.sin(),
            -centripetal * phi.cos(),
            -centripetal * phi.sin(),
        ]
    }

    #[test]
    fn test_record_access() {
        let mut raw = RawTrajectory::new();
        raw.push_record([0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        raw.data.push(7.0);
        assert_eq!(raw.records(), 1);
        assert_eq!(raw.record(0).unwrap()[AY_IDX], 6.0);
        assert!(raw.record(1).is_none());
    }

    #[test]
    fn test_offset_is_added_back() {
        let mut raw = RawTrajectory::new();
        raw.push_record([0.0, 1.0, 2.0, 2.0, 0.0, 0.0, 0.0]);
        raw.push_record([0.5, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0]);
        let trajectory = raw.to_discretized_trajectory(MapOffset::new(100.0, -50.0), false, 0.5);
        assert_eq!(trajectory.len(), 2);
        assert!((trajectory[0].x() - 101.0).abs() < 1e-12);
        assert!((trajectory[0].y() + 48.0).abs() < 1e-12);
        assert!((trajectory[1].path_point.s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_circle_kinematics() {
        let (v, radius) = (5.0, 20.0);
        let mut raw = RawTrajectory::new();
        for i in 0..10 {
            raw.push_record(circle_record(i as f64 * 0.25, v, radius));
        }
        let trajectory = raw.to_discretized_trajectory(MapOffset::default(), true, 0.5);
        assert_eq!(trajectory.len(), 10);
        for point in trajectory.iter() {
            assert!((point.v - v).abs() < 1e-9);
            assert!(point.a.abs() < 1e-9);
            assert!((point.kappa() - 1.0 / radius).abs() < 1e-9);
        }
        assert!(trajectory.is_time_monotonic());
    }

    #[test]
    fn test_low_speed_cutoff() {
        let mut raw = RawTrajectory::new();
        raw.push_record([0.0, 0.0, 0.0, 2.0, 0.0, -2.0, 0.0]);
        raw.push_record([0.25, 0.5, 0.0, 1.0, 0.0, -2.0, 0.0]);
        raw.push_record([0.5, 0.7, 0.0, 0.4, 0.3, -2.0, 0.0]);
        raw.push_record([0.75, 0.8, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let cut = raw.to_discretized_trajectory(MapOffset::default(), true, 0.5);
        assert_eq!(cut.len(), 2);
        let full = raw.to_discretized_trajectory(MapOffset::default(), false, 0.5);
        assert_eq!(full.len(), 4);
    }

    #[test]
    fn test_heading_kept_at_standstill() {
        let mut raw = RawTrajectory::new();
        raw.push_record([0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        raw.push_record([0.25, 0.0, 0.1, 0.0, 0.0, 0.0, 0.0]);
        let trajectory = raw.to_discretized_trajectory(MapOffset::default(), false, 0.5);
        assert!((trajectory[1].theta() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(trajectory[1].kappa(), 0.0);
        assert_eq!(trajectory[1].v, 0.0);
    }
}
