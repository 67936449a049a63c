//! Configuration loading and environment variable handling

use crate::domains::PlannerConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment prefix shared with the worker (`FL_MISSION_APP_DATA`, ...)
pub const DEFAULT_ENV_PREFIX: &str = "FL_MISSION";

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<PlannerConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: PlannerConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<PlannerConfig> {
        let mut config = PlannerConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<PlannerConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut PlannerConfig) -> ConfigResult<()> {
        self.apply_worker_overrides(&mut config.worker)?;
        self.apply_bridge_overrides(&mut config.bridge)?;
        self.apply_supervisor_overrides(&mut config.supervisor)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply worker launch overrides
    fn apply_worker_overrides(
        &self,
        config: &mut crate::domains::worker::WorkerConfig,
    ) -> ConfigResult<()> {
        if let Some(bin) = self.get_path_var("WORKER_BIN") {
            config.executable = Some(bin);
        }

        if let Ok(python) = self.get_env_var("PYTHON") {
            config.python = python;
        }

        if let Some(source) = self.get_path_var("WORKER_SOURCE") {
            config.source_root = Some(source);
        }

        if let Ok(packaged) = self.get_env_var("PACKAGED") {
            config.packaged = Some(parse_flag(&packaged).ok_or_else(|| {
                self.env_error("PACKAGED", format!("expected a boolean, got '{}'", packaged))
            })?);
        }

        if let Some(data_dir) = self.get_path_var("APP_DATA") {
            config.data_dir = Some(data_dir);
        }

        Ok(())
    }

    /// Apply HTTP bridge overrides
    fn apply_bridge_overrides(
        &self,
        config: &mut crate::domains::bridge::BridgeConfig,
    ) -> ConfigResult<()> {
        if let Ok(host) = self.get_env_var("WORKER_HOST") {
            config.host = host;
        }

        if let Some(port) = self.parse_env_var("WORKER_PORT")? {
            config.port = port;
        }

        if let Some(seconds) = self.parse_env_var("REQUEST_TIMEOUT")? {
            config.request_timeout = Duration::from_secs(seconds);
        }

        Ok(())
    }

    /// Apply supervision policy overrides
    fn apply_supervisor_overrides(
        &self,
        config: &mut crate::domains::supervisor::SupervisorConfig,
    ) -> ConfigResult<()> {
        if let Some(attempts) = self.parse_env_var("PROBE_ATTEMPTS")? {
            config.probe_attempts = attempts;
        }

        if let Some(millis) = self.parse_env_var("PROBE_INTERVAL_MS")? {
            config.probe_interval = Duration::from_millis(millis);
        }

        if let Some(millis) = self.parse_env_var("STOP_TIMEOUT_MS")? {
            config.stop_timeout = Duration::from_millis(millis);
        }

        if let Some(restarts) = self.parse_env_var("MAX_RESTARTS")? {
            config.max_restarts_per_request = restarts;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|e| self.env_error("LOG_LEVEL", e))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|e| self.env_error("LOG_FORMAT", e))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }

    fn env_error(&self, name: &str, message: impl ToString) -> ConfigError {
        ConfigError::Env {
            var: format!("{}_{}", self.prefix, name),
            message: message.to_string(),
        }
    }

    /// Get a non-empty path-valued environment variable
    fn get_path_var(&self, name: &str) -> Option<PathBuf> {
        self.get_env_var(name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Parse an environment variable, reporting malformed values
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| self.env_error(name, e)),
            Err(_) => Ok(None),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
