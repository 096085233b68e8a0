//! Planning orchestrator around the discrete engine
//!
//! [`MiqpPlanner`] runs one planning cycle per call: mode decision, engine setup,
//! obstacle registration, engine solve or reference retrieval, collision checks and
//! smoothing. Engines plug in through [`DiscreteEngine`].

pub mod collision;
pub mod config;
pub mod engine;
pub mod miqp_planner;
pub mod mode;
pub mod reference_engine;
pub mod reference_line;
pub mod wire;

pub use collision::{CollisionReport, ObstacleCollision};
pub use config::{EngineConfig, EngineSettings, MiqpPlannerConfig, PlannerConfig, VehicleConfig};
pub use engine::{CarHandle, CarSpec, CarUpdate, DiscreteEngine, ObstacleHandle, SecondOrderState};
pub use miqp_planner::{MiqpPlanner, PlannerSession, PlanningOutput, PlanningRequest};
pub use mode::{desired_motion, determine_planner_mode, DesiredMotion, ModeThresholds, PlannerMode};
pub use reference_engine::ReferenceFollowingEngine;
pub use reference_line::RoadBoundaries;
pub use wire::{MapOffset, RawTrajectory};
