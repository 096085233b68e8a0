//! Error types for rust_trajectory_planner

use thiserror::Error;

/// Tag of a [`PlanningError`], for callers that dispatch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationMissing,
    InvalidConfiguration,
    EngineSolveFailure,
    ObstacleProcessingFailure,
    InsufficientValidPoints,
    SmoothingFailure,
    SolverException,
    InvalidInput,
    Io,
}

/// Main error type of the planning core
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Planner configuration could not be found
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),
    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Discrete engine did not find a solution
    #[error("Engine solve failure: {0}")]
    EngineSolveFailure(String),
    /// Obstacles could not be handed to the engine
    #[error("Obstacle processing failure: {0}")]
    ObstacleProcessingFailure(String),
    /// Engine returned too few usable points
    #[error("Insufficient valid points: got {valid}, need at least {required}")]
    InsufficientValidPoints { valid: usize, required: usize },
    /// Smoothing did not produce a usable trajectory
    #[error("Smoothing failure: {0}")]
    SmoothingFailure(String),
    /// Numerical failure inside a solver
    #[error("Solver exception: {0}")]
    SolverException(String),
    /// Input data violates a precondition
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file is not valid TOML
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl PlanningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanningError::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            PlanningError::InvalidConfiguration(_) | PlanningError::ConfigParse(_) => {
                ErrorKind::InvalidConfiguration
            }
            PlanningError::EngineSolveFailure(_) => ErrorKind::EngineSolveFailure,
            PlanningError::ObstacleProcessingFailure(_) => ErrorKind::ObstacleProcessingFailure,
            PlanningError::InsufficientValidPoints { .. } => ErrorKind::InsufficientValidPoints,
            PlanningError::SmoothingFailure(_) => ErrorKind::SmoothingFailure,
            PlanningError::SolverException(_) => ErrorKind::SolverException,
            PlanningError::InvalidInput(_) => ErrorKind::InvalidInput,
            PlanningError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanningError::EngineSolveFailure("miqp planner failed!".to_string());
        assert_eq!(format!("{}", err), "Engine solve failure: miqp planner failed!");

        let err = PlanningError::InsufficientValidPoints { valid: 3, required: 14 };
        assert_eq!(
            format!("{}", err),
            "Insufficient valid points: got 3, need at least 14"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlanningError = io_err.into();
        assert!(matches!(err, PlanningError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kind() {
        let err = PlanningError::SmoothingFailure("status -11".to_string());
        assert_eq!(err.kind(), ErrorKind::SmoothingFailure);
    }
}
