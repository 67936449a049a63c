//! Worker launch configuration

use crate::error::ConfigResult;
use crate::validation::{validate_enum_choice, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log levels understood by the worker's `--log-level` flag
pub const WORKER_LOG_LEVELS: &[&str] = &["critical", "error", "warning", "info", "debug", "trace"];

/// How the worker process is located and started
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Explicit worker executable; wins over every other resolution rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Python interpreter used when running from source
    pub python: String,

    /// Python module started with `-m` when running from source
    pub module: String,

    /// Worker source root; defaults to the current directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,

    /// Force packaged (`true`) or source (`false`) mode; detected when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packaged: Option<bool>,

    /// Bundled resources directory; defaults to the application executable's directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<PathBuf>,

    /// Writable cache/data directory handed to the worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Level passed to the worker's `--log-level`
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            executable: None,
            python: default_python().to_string(),
            module: "server.main".to_string(),
            source_root: None,
            packaged: None,
            resources_dir: None,
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Data directory, falling back to the platform data directory
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }

        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("fl-mission-planner")
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.python, "python", self.domain_name())?;
        validate_required_string(&self.module, "module", self.domain_name())?;
        validate_enum_choice(
            &self.log_level,
            WORKER_LOG_LEVELS,
            "log_level",
            self.domain_name(),
        )?;

        if let Some(exe) = &self.executable {
            if exe.as_os_str().is_empty() {
                return Err(self.validation_error("executable cannot be empty"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}
