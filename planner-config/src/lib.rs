//! Domain-driven configuration for the mission planner
//!
//! Configuration is split by functional domain (worker launch, HTTP bridge,
//! supervision policy, logging), each with defaults, validation and
//! `FL_MISSION_*` environment variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    bridge::BridgeConfig, logging::LoggingConfig, supervisor::SupervisorConfig,
    worker::WorkerConfig, PlannerConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_ms};
