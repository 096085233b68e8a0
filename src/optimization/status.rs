//! Termination statuses of the nonlinear solver
//!
//! Codes follow the NLopt numbering so that logs stay comparable with other
//! planners; the planner-specific `SolverException` and `NotInitialized` extend it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverStatus {
    Success,
    StopvalReached,
    FtolReached,
    XtolReached,
    MaxevalReached,
    MaxtimeReached,
    /// Progress stopped by floating point limits; the last iterate is still usable
    RoundoffLimited,
    Failure,
    InvalidArgs,
    OutOfMemory,
    ForcedStop,
    SolverException,
    NotInitialized,
}

impl SolverStatus {
    pub fn code(&self) -> i32 {
        match self {
            SolverStatus::Success => 1,
            SolverStatus::StopvalReached => 2,
            SolverStatus::FtolReached => 3,
            SolverStatus::XtolReached => 4,
            SolverStatus::MaxevalReached => 5,
            SolverStatus::MaxtimeReached => 6,
            SolverStatus::RoundoffLimited => 10,
            SolverStatus::Failure => -1,
            SolverStatus::InvalidArgs => -2,
            SolverStatus::OutOfMemory => -3,
            SolverStatus::ForcedStop => -5,
            SolverStatus::SolverException => -11,
            SolverStatus::NotInitialized => -100,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            1 => SolverStatus::Success,
            2 => SolverStatus::StopvalReached,
            3 => SolverStatus::FtolReached,
            4 => SolverStatus::XtolReached,
            5 => SolverStatus::MaxevalReached,
            6 => SolverStatus::MaxtimeReached,
            10 => SolverStatus::RoundoffLimited,
            -1 => SolverStatus::Failure,
            -2 => SolverStatus::InvalidArgs,
            -3 => SolverStatus::OutOfMemory,
            -5 => SolverStatus::ForcedStop,
            -11 => SolverStatus::SolverException,
            -100 => SolverStatus::NotInitialized,
            _ => return None,
        };
        Some(status)
    }

    /// Positive codes leave a result that may be used downstream
    pub fn is_usable(&self) -> bool {
        self.code() > 0
    }

    /// Usable, but hit a limit before converging
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            SolverStatus::MaxevalReached | SolverStatus::MaxtimeReached | SolverStatus::RoundoffLimited
        )
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}
