//! Bridge client configuration

use planner_config::BridgeConfig;
use std::time::Duration;

/// Settings for the worker HTTP client
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Base URL of the worker, e.g. `http://127.0.0.1:8765`
    pub base_url: String,

    /// Timeout for compute requests
    pub request_timeout: Duration,

    /// Timeout for a single health check
    pub health_timeout: Duration,

    /// User agent string
    pub user_agent: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeConfig::default().into()
    }
}

impl BridgeSettings {
    /// Settings pointing at an explicit base URL
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl From<BridgeConfig> for BridgeSettings {
    fn from(config: BridgeConfig) -> Self {
        Self {
            base_url: config.base_url(),
            request_timeout: config.request_timeout,
            health_timeout: config.health_timeout,
            user_agent: format!("fl-mission-planner/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&BridgeConfig> for BridgeSettings {
    fn from(config: &BridgeConfig) -> Self {
        config.clone().into()
    }
}
