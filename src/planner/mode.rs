//! Planner modes and the desired motion handed to the engine in each of them

use std::fmt;

use super::config::MiqpPlannerConfig;

/// What the planner does in the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerMode {
    /// At the destination and not moving; the engine is not involved
    Standstill,
    /// Too slow for the engine model; follow the reference while speeding up
    Start,
    /// Close to the stop point; follow the reference while braking
    Stop,
    /// Full engine solve
    Driving,
}

impl PlannerMode {
    /// Whether the trajectory is taken from the engine's reference instead of a solve
    pub fn uses_reference_trajectory(&self) -> bool {
        matches!(self, PlannerMode::Start | PlannerMode::Stop)
    }
}

impl fmt::Display for PlannerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlannerMode::Standstill => "STANDSTILL",
            PlannerMode::Start => "START",
            PlannerMode::Stop => "STOP",
            PlannerMode::Driving => "DRIVING",
        };
        write!(f, "{}", name)
    }
}

/// Thresholds of the mode decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeThresholds {
    pub standstill_velocity_threshold: f64,
    pub destination_distance_stop_threshold: f64,
    pub minimum_valid_speed_planning: f64,
    pub distance_stop_before: f64,
    pub distance_start_slowdown: f64,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self::from(&MiqpPlannerConfig::default())
    }
}

impl From<&MiqpPlannerConfig> for ModeThresholds {
    fn from(config: &MiqpPlannerConfig) -> Self {
        Self {
            standstill_velocity_threshold: config.standstill_velocity_threshold,
            destination_distance_stop_threshold: config.destination_distance_stop_threshold,
            minimum_valid_speed_planning: config.minimum_valid_speed_planning,
            distance_stop_before: config.distance_stop_before,
            distance_start_slowdown: config.distance_start_slowdown,
        }
    }
}

impl ModeThresholds {
    fn in_stop_region(&self, stop_dist: f64) -> bool {
        stop_dist - self.distance_stop_before < self.distance_start_slowdown
    }
}

/// Classify the cycle from the current speed and the distance to the stop point
///
/// # Arguments
/// * `velocity` - current speed [m/s]
/// * `stop_dist` - distance to the stop point along the reference [m]
/// * `thresholds` - decision thresholds
pub fn determine_planner_mode(velocity: f64, stop_dist: f64, thresholds: &ModeThresholds) -> PlannerMode {
    if velocity < thresholds.standstill_velocity_threshold
        && stop_dist < thresholds.destination_distance_stop_threshold
    {
        PlannerMode::Standstill
    } else if velocity < thresholds.minimum_valid_speed_planning {
        PlannerMode::Start
    } else if thresholds.in_stop_region(stop_dist) {
        PlannerMode::Stop
    } else {
        PlannerMode::Driving
    }
}

/// Target handed to the engine for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesiredMotion {
    pub velocity: f64,
    pub offset: f64,
    pub track_reference_position: bool,
}

/// Desired velocity, offset and tracking flag for `mode`
pub fn desired_motion(mode: PlannerMode, stop_dist: f64, config: &MiqpPlannerConfig) -> DesiredMotion {
    let thresholds = ModeThresholds::from(config);
    let stop_offset = (stop_dist - config.distance_stop_before).max(0.0);
    if thresholds.in_stop_region(stop_dist) {
        let velocity = if mode == PlannerMode::Start {
            config.cruise_speed
        } else {
            0.0
        };
        DesiredMotion {
            velocity,
            offset: stop_offset,
            track_reference_position: false,
        }
    } else {
        DesiredMotion {
            velocity: config.cruise_speed,
            offset: config.delta_s_desired,
            track_reference_position: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_decision() {
        let thresholds = ModeThresholds::default();
        assert_eq!(determine_planner_mode(0.05, 0.1, &thresholds), PlannerMode::Standstill);
        assert_eq!(determine_planner_mode(0.5, 50.0, &thresholds), PlannerMode::Start);
        assert_eq!(determine_planner_mode(5.0, 2.0, &thresholds), PlannerMode::Stop);
        assert_eq!(determine_planner_mode(5.0, 50.0, &thresholds), PlannerMode::Driving);
    }

    #[test]
    fn test_slow_vehicle_near_stop_is_starting() {
        let thresholds = ModeThresholds::default();
        assert_eq!(determine_planner_mode(0.5, 5.0, &thresholds), PlannerMode::Start);
        // slow but not yet at the destination
        assert_eq!(determine_planner_mode(0.05, 0.6, &thresholds), PlannerMode::Start);
        assert_eq!(determine_planner_mode(1.0, 5.0, &thresholds), PlannerMode::Stop);
    }

    #[test]
    fn test_stop_region_boundary() {
        let thresholds = ModeThresholds::default();
        assert_eq!(determine_planner_mode(5.0, 10.99, &thresholds), PlannerMode::Stop);
        assert_eq!(determine_planner_mode(5.0, 11.0, &thresholds), PlannerMode::Driving);
    }

    #[test]
    fn test_desired_motion() {
        let config = MiqpPlannerConfig::default();

        let stop = desired_motion(PlannerMode::Stop, 4.0, &config);
        assert_eq!(stop.velocity, 0.0);
        assert!((stop.offset - 3.0).abs() < 1e-12);
        assert!(!stop.track_reference_position);

        let close = desired_motion(PlannerMode::Stop, 0.5, &config);
        assert_eq!(close.offset, 0.0);

        // creeping up to the stop point from low speed
        let mode = determine_planner_mode(0.5, 5.0, &ModeThresholds::from(&config));
        let start = desired_motion(mode, 5.0, &config);
        assert_eq!(start.velocity, config.cruise_speed);
        assert!((start.offset - 4.0).abs() < 1e-12);
        assert!(!start.track_reference_position);

        let driving = desired_motion(PlannerMode::Driving, 50.0, &config);
        assert_eq!(driving.velocity, config.cruise_speed);
        assert_eq!(driving.offset, config.delta_s_desired);
        assert!(driving.track_reference_position);
    }

    #[test]
    fn test_display() {
        assert_eq!(PlannerMode::Standstill.to_string(), "STANDSTILL");
        assert!(PlannerMode::Stop.uses_reference_trajectory());
        assert!(!PlannerMode::Driving.uses_reference_trajectory());
    }
}
