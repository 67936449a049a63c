//! Supervision policy configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Startup, shutdown and recovery policy for the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Health checks attempted before startup is declared failed
    pub probe_attempts: u32,

    /// Delay between health checks
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub probe_interval: Duration,

    /// How long a stop waits for the process to exit
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub stop_timeout: Duration,

    /// Restart-and-retry cycles allowed per request on transient failures
    pub max_restarts_per_request: u32,

    /// Warm the worker's boundary cache once it is ready
    #[serde(default = "crate::domains::utils::default_true")]
    pub reconcile_on_start: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_attempts: 60,
            probe_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_millis(2000),
            max_restarts_per_request: 1,
            reconcile_on_start: true,
        }
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.probe_attempts, "probe_attempts", self.domain_name())?;

        if self.probe_interval.is_zero() {
            return Err(self.validation_error("probe_interval must be greater than 0"));
        }
        if self.stop_timeout.is_zero() {
            return Err(self.validation_error("stop_timeout must be greater than 0"));
        }
        if self.max_restarts_per_request > 10 {
            return Err(self.validation_error(format!(
                "max_restarts_per_request must be at most 10, got {}",
                self.max_restarts_per_request
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}
