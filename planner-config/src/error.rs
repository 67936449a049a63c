//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why a planner configuration could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A `FL_MISSION_*` override holds a malformed value
    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    /// A loaded value fails its domain's validation
    #[error("Invalid {domain} configuration: {message}")]
    Invalid {
        domain: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Configuration domain at fault, for validation failures
    pub fn domain(&self) -> Option<&'static str> {
        match self {
            ConfigError::Invalid { domain, .. } => Some(domain),
            _ => None,
        }
    }
}
