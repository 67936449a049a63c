//! Resilience patterns for the mission planner
//!
//! Classification of failed worker calls into restartable and fatal
//! failures, and termination of the worker process.

pub mod recovery;
pub mod shutdown;

// Re-export commonly used types
pub use recovery::{Recoverable, Recovery, RecoveryDecision, RecoveryPolicy};
pub use shutdown::{ProcessShutdownManager, ShutdownError, TerminationMode};
