//! Domain-specific configuration modules

pub mod bridge;
pub mod logging;
pub mod supervisor;
pub mod utils;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main planner configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannerConfig {
    /// Worker launch configuration
    #[serde(default)]
    pub worker: worker::WorkerConfig,

    /// HTTP bridge configuration
    #[serde(default)]
    pub bridge: bridge::BridgeConfig,

    /// Supervision policy
    #[serde(default)]
    pub supervisor: supervisor::SupervisorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl PlannerConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.worker.validate()?;
        self.bridge.validate()?;
        self.supervisor.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = PlannerConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
