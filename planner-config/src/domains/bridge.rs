//! HTTP bridge configuration

use crate::error::ConfigResult;
use crate::validation::{validate_loopback_host, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the worker listens and how long calls to it may take
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Loopback host the worker binds
    pub host: String,

    /// Port the worker binds
    pub port: u16,

    /// Timeout for a single compute request
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub request_timeout: Duration,

    /// Timeout for a single health probe
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub health_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            request_timeout: Duration::from_secs(120),
            health_timeout: Duration::from_secs(2),
        }
    }
}

impl BridgeConfig {
    /// `host:port` as handed to the worker
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Base URL for requests to the worker
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address())
    }
}

impl Validatable for BridgeConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_loopback_host(&self.host, "host", self.domain_name())?;
        validate_positive(self.port, "port", self.domain_name())?;

        if self.request_timeout.is_zero() {
            return Err(self.validation_error("request_timeout must be greater than 0"));
        }
        if self.health_timeout.is_zero() {
            return Err(self.validation_error("health_timeout must be greater than 0"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_defaults() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "127.0.0.1:8765");
        assert_eq!(config.base_url(), "http://127.0.0.1:8765");
    }

    #[test]
    fn test_ipv6_address_is_bracketed() {
        let config = BridgeConfig {
            host: "::1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "http://[::1]:8765");
    }

    #[test]
    fn test_rejects_remote_host() {
        let config = BridgeConfig {
            host: "192.168.1.20".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
