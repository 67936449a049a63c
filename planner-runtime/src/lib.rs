//! Worker lifecycle management for the mission planner
//!
//! The [`Supervisor`] owns the single worker process: it launches it lazily,
//! gates requests until the worker answers its health check, restarts it on
//! transient failures and shuts it down on application exit.

pub mod error;
pub mod launcher;
pub mod probe;
pub mod resolve;
pub mod supervisor;

pub use error::{LaunchError, ProbeError, StartupError, SupervisorError};
pub use launcher::{
    ExitReport, LaunchSpec, Launcher, ProcessLauncher, WorkerHandle, WorkerSignals,
};
pub use probe::ReadinessProbe;
pub use resolve::{LaunchMode, LaunchResolver};
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorStats, WorkerState};
