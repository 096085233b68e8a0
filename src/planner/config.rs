//! Planner configuration, loaded from TOML
//!
//! Every section falls back to its defaults, so a config file only needs the
//! values it changes:
//!
//! ```toml
//! [planner]
//! use_smoothing = false
//!
//! [engine]
//! nr_steps = 30
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{PlanningError, PlanningResult};
use crate::obstacles::ObstacleConfig;
use crate::smoothing::{ProblemParameters, SolverParameters};

/// Orchestrator flags, thresholds and distances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiqpPlannerConfig {
    pub use_smoothing: bool,
    /// Intermediate smoothing steps between engine points
    pub smoothing_subsampling: usize,
    pub consider_obstacles: bool,
    /// Send the road polygon to the engine and check the result against it
    pub use_environment_polygon: bool,
    /// Turn collisions found after a successful solve into an error
    pub reject_on_collision: bool,
    /// Subtracted from all coordinates handed to the engine [m]
    pub pts_offset_x: f64,
    pub pts_offset_y: f64,
    /// Target speed outside the stop region [m/s]
    pub cruise_speed: f64,
    /// Desired offset along the reference while tracking it [m]
    pub delta_s_desired: f64,
    /// [m/s]
    pub standstill_velocity_threshold: f64,
    /// Below this speed the engine model is not valid [m/s]
    pub minimum_valid_speed_planning: f64,
    /// Engine points with both |vx| and |vy| below this are invalid [m/s]
    pub minimum_valid_speed_vx_vy: f64,
    /// [m]
    pub destination_distance_stop_threshold: f64,
    /// Keep this distance to the stop point [m]
    pub distance_stop_before: f64,
    /// Start slowing down this far ahead of the stop point [m]
    pub distance_start_slowdown: f64,
    /// Reference kept beyond the stop point [m]
    pub cutoff_distance_reference_after_stop: f64,
    /// Fraction of `nr_steps` the engine trajectory must keep after the validity cut
    pub minimum_percentage_valid_points: f64,
}

impl Default for MiqpPlannerConfig {
    fn default() -> Self {
        Self {
            use_smoothing: true,
            smoothing_subsampling: 3,
            consider_obstacles: true,
            use_environment_polygon: false,
            reject_on_collision: false,
            pts_offset_x: 0.0,
            pts_offset_y: 0.0,
            cruise_speed: 8.0,
            delta_s_desired: 0.0,
            standstill_velocity_threshold: 0.1,
            minimum_valid_speed_planning: 1.0,
            minimum_valid_speed_vx_vy: 0.5,
            destination_distance_stop_threshold: 0.5,
            distance_stop_before: 1.0,
            distance_start_slowdown: 10.0,
            cutoff_distance_reference_after_stop: 5.0,
            minimum_percentage_valid_points: 0.5,
        }
    }
}

/// Discrete engine section as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Horizon length
    pub nr_steps: usize,
    /// Horizon timestep [s]
    pub ts: f64,
    /// Wall-clock budget of one solve [s]
    pub max_solution_time: f64,
    /// Added to half the vehicle width to get the collision radius [m]
    pub collision_radius_add: f64,
    pub acc_lon_max_limit: f64,
    pub acc_lon_min_limit: f64,
    pub acc_lat_min_max_limit: f64,
    /// Obstacle capacity of the engine
    pub max_obstacles: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nr_steps: 20,
            ts: 0.25,
            max_solution_time: 5.0,
            collision_radius_add: 0.0,
            acc_lon_max_limit: 2.0,
            acc_lon_min_limit: -4.0,
            acc_lat_min_max_limit: 1.6,
            max_obstacles: 64,
        }
    }
}

/// Vehicle geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub length: f64,
    pub width: f64,
    /// Distance from the rear edge to the reference point [m]
    pub back_edge_to_center: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            length: 4.933,
            width: 2.11,
            back_edge_to_center: 1.043,
        }
    }
}

/// What an engine needs to be created
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub nr_steps: usize,
    pub ts: f64,
    pub max_solution_time: f64,
    pub collision_radius: f64,
    pub acc_lon_max_limit: f64,
    pub acc_lon_min_limit: f64,
    pub acc_lat_min_max_limit: f64,
    pub max_obstacles: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        PlannerConfig::default().engine_settings()
    }
}

/// Complete configuration of the planning core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub planner: MiqpPlannerConfig,
    pub engine: EngineConfig,
    pub obstacles: ObstacleConfig,
    pub smoother: ProblemParameters,
    pub smoother_solver: SolverParameters,
    pub vehicle: VehicleConfig,
}

impl PlannerConfig {
    pub fn from_toml_str(content: &str) -> PlanningResult<Self> {
        let config: PlannerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> PlanningResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PlanningError::ConfigurationMissing(format!(
                "no planner configuration at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> PlanningResult<()> {
        let invalid = |msg: String| Err(PlanningError::InvalidConfiguration(msg));
        if self.engine.nr_steps == 0 {
            return invalid("engine.nr_steps must be positive".to_string());
        }
        if !(self.engine.ts > 0.0) {
            return invalid(format!("engine.ts must be positive, got {}", self.engine.ts));
        }
        if !(self.engine.max_solution_time > 0.0) {
            return invalid(format!(
                "engine.max_solution_time must be positive, got {}",
                self.engine.max_solution_time
            ));
        }
        if !(0.0..=1.0).contains(&self.planner.minimum_percentage_valid_points) {
            return invalid(format!(
                "planner.minimum_percentage_valid_points must be within [0, 1], got {}",
                self.planner.minimum_percentage_valid_points
            ));
        }
        if !(self.vehicle.width > 0.0 && self.vehicle.length > 0.0) {
            return invalid("vehicle dimensions must be positive".to_string());
        }
        if self.engine.acc_lon_min_limit >= 0.0 || self.engine.acc_lon_max_limit <= 0.0 {
            return invalid("engine acceleration limits must bracket zero".to_string());
        }
        Ok(())
    }

    /// Collision radius of the ego vehicle as seen by the engine
    pub fn collision_radius(&self) -> f64 {
        self.vehicle.width / 2.0 + self.engine.collision_radius_add
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            nr_steps: self.engine.nr_steps,
            ts: self.engine.ts,
            max_solution_time: self.engine.max_solution_time,
            collision_radius: self.collision_radius(),
            acc_lon_max_limit: self.engine.acc_lon_max_limit,
            acc_lon_min_limit: self.engine.acc_lon_min_limit,
            acc_lat_min_max_limit: self.engine.acc_lat_min_max_limit,
            max_obstacles: self.engine.max_obstacles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.nr_steps, 20);
        assert_eq!(config.engine.ts, 0.25);
        assert_eq!(config.planner.smoothing_subsampling, 3);
        assert!(!config.planner.reject_on_collision);
        assert!((config.collision_radius() - 1.055).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml() {
        let config = PlannerConfig::from_toml_str(
            r#"
            [planner]
            use_smoothing = false
            pts_offset_x = 100.0

            [engine]
            nr_steps = 30

            [smoother]
            cost_jerk = 4.0
            "#,
        )
        .unwrap();
        assert!(!config.planner.use_smoothing);
        assert_eq!(config.planner.pts_offset_x, 100.0);
        assert_eq!(config.engine.nr_steps, 30);
        assert_eq!(config.engine.ts, 0.25);
        assert_eq!(config.smoother.cost_jerk, 4.0);
        assert_eq!(config.smoother_solver.max_num_evals, 1000);
    }

    #[test]
    fn test_invalid_values() {
        let err = PlannerConfig::from_toml_str("[engine]\nts = 0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        let err = PlannerConfig::from_toml_str("[engine]\nnr_steps = 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_malformed_toml() {
        let err = PlannerConfig::from_toml_str("[engine\nts = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_missing_file() {
        let err = PlannerConfig::from_file("/nonexistent/planner.toml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = PlannerConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = PlannerConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.engine_settings(), config.engine_settings());
    }
}
