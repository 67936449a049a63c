//! Runtime error types

use crate::launcher::ExitReport;
use planner_http::{BridgeError, ServiceFailure, ValidationIssue};
use planner_resilience::Recoverable;
use thiserror::Error;

/// Failure to create the worker process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Worker executable not found: {program}")]
    NotFound { program: String },

    #[error("Failed to spawn worker '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Cannot resolve worker launch: {0}")]
    Resolve(String),
}

/// Failure of the readiness probe
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Worker did not become healthy after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Readiness probe cancelled")]
    Cancelled,
}

/// Failure to bring the worker to `Ready`.
///
/// Shared by every caller awaiting the same start operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error(transparent)]
    Spawn(#[from] LaunchError),

    #[error("Worker did not become healthy after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Worker exited during startup ({0})")]
    ExitedDuringStartup(ExitReport),

    #[error("Worker startup cancelled")]
    Cancelled,

    #[error("Supervisor is shutting down")]
    ShuttingDown,

    #[error("Worker startup was abandoned")]
    Aborted,
}

impl From<ProbeError> for StartupError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Timeout { attempts } => StartupError::Timeout { attempts },
            ProbeError::Cancelled => StartupError::Cancelled,
        }
    }
}

/// Error returned to callers of the supervisor
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The worker kept failing at runtime after the restart budget was spent
    #[error("Worker unavailable: {0}")]
    Transient(BridgeError),

    /// The worker rejected the request content
    #[error("{0}")]
    Domain(ServiceFailure),

    /// The worker answered with something the caller cannot use
    #[error("Protocol error: {0}")]
    Protocol(BridgeError),
}

impl SupervisorError {
    /// Structured problems the worker reported, if any
    pub fn validation_errors(&self) -> &[ValidationIssue] {
        match self {
            SupervisorError::Domain(failure) => &failure.errors,
            _ => &[],
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, SupervisorError::Domain(_))
    }

    pub(crate) fn decode(err: serde_json::Error) -> Self {
        SupervisorError::Protocol(BridgeError::Decode(err.to_string()))
    }
}

impl From<BridgeError> for SupervisorError {
    fn from(err: BridgeError) -> Self {
        if err.is_transient() {
            return SupervisorError::Transient(err);
        }
        match err {
            BridgeError::Service(failure) => SupervisorError::Domain(failure),
            other => SupervisorError::Protocol(other),
        }
    }
}
