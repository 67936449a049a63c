//! Resolution of how the worker is launched
//!
//! In order of precedence: an explicit executable, the bundled worker of a
//! packaged install, and finally `python -m server.main` from a source tree.

use crate::error::LaunchError;
use crate::launcher::LaunchSpec;
use planner_config::{BridgeConfig, PlannerConfig, WorkerConfig};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the bundled worker executable, without platform suffix
pub const BUNDLED_WORKER_NAME: &str = "fl-mission-worker";

/// Environment variable carrying the writable data directory
pub const APP_DATA_ENV: &str = "FL_MISSION_APP_DATA";

/// Environment variable carrying the address the worker must bind
pub const WORKER_ADDR_ENV: &str = "FL_MISSION_WORKER_ADDR";

/// Which resolution rule produced the launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Override,
    Packaged,
    Source,
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchMode::Override => write!(f, "override"),
            LaunchMode::Packaged => write!(f, "packaged"),
            LaunchMode::Source => write!(f, "source"),
        }
    }
}

/// Turns configuration into a [`LaunchSpec`]
#[derive(Debug, Clone)]
pub struct LaunchResolver {
    worker: WorkerConfig,
    bridge: BridgeConfig,
    /// Directory of the running application executable
    exe_dir: Option<PathBuf>,
    /// Inherited `PYTHONPATH`
    python_path: Option<OsString>,
    /// Fallback source root
    cwd: Option<PathBuf>,
}

impl LaunchResolver {
    /// Resolver for the current process environment
    pub fn from_config(config: &PlannerConfig) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Self {
            worker: config.worker.clone(),
            bridge: config.bridge.clone(),
            exe_dir,
            python_path: std::env::var_os("PYTHONPATH"),
            cwd: std::env::current_dir().ok(),
        }
    }

    /// Resolver with explicit host context
    pub fn new(worker: WorkerConfig, bridge: BridgeConfig) -> Self {
        Self {
            worker,
            bridge,
            exe_dir: None,
            python_path: None,
            cwd: None,
        }
    }

    pub fn with_exe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exe_dir = Some(dir.into());
        self
    }

    pub fn with_python_path(mut self, python_path: impl Into<OsString>) -> Self {
        self.python_path = Some(python_path.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Path of the bundled worker, if a resources directory is known
    pub fn bundled_worker(&self) -> Option<PathBuf> {
        let resources = self
            .worker
            .resources_dir
            .clone()
            .or_else(|| self.exe_dir.clone())?;

        Some(
            resources
                .join("worker")
                .join(format!("{}{}", BUNDLED_WORKER_NAME, std::env::consts::EXE_SUFFIX)),
        )
    }

    /// Which rule applies
    pub fn mode(&self) -> LaunchMode {
        if self.worker.executable.is_some() {
            return LaunchMode::Override;
        }

        let packaged = self.worker.packaged.unwrap_or_else(|| {
            self.bundled_worker()
                .map(|path| path.is_file())
                .unwrap_or(false)
        });

        if packaged {
            LaunchMode::Packaged
        } else {
            LaunchMode::Source
        }
    }

    /// Build the launch for the applicable rule
    pub fn resolve(&self) -> Result<LaunchSpec, LaunchError> {
        let mode = self.mode();

        let spec = match mode {
            LaunchMode::Override => {
                let program = self.worker.executable.clone().ok_or_else(|| {
                    LaunchError::Resolve("worker executable override is empty".to_string())
                })?;
                let spec = LaunchSpec::new(program.clone());
                match program.parent().filter(|p| !p.as_os_str().is_empty()) {
                    Some(dir) => spec.current_dir(dir),
                    None => spec,
                }
            }
            LaunchMode::Packaged => {
                let program = self.bundled_worker().ok_or_else(|| {
                    LaunchError::Resolve(
                        "packaged mode requested but no resources directory is known".to_string(),
                    )
                })?;
                let dir = program.parent().map(Path::to_path_buf);
                let spec = LaunchSpec::new(program);
                match dir {
                    Some(dir) => spec.current_dir(dir),
                    None => spec,
                }
            }
            LaunchMode::Source => {
                let source_root = self
                    .worker
                    .source_root
                    .clone()
                    .or_else(|| self.cwd.clone())
                    .ok_or_else(|| {
                        LaunchError::Resolve("worker source root is unknown".to_string())
                    })?;

                LaunchSpec::new(&self.worker.python)
                    .arg("-m")
                    .arg(&self.worker.module)
                    .env("PYTHONPATH", self.python_path_with(&source_root)?)
                    .env("PYTHONUNBUFFERED", "1")
                    .current_dir(source_root)
            }
        };

        let spec = spec
            .arg("--host")
            .arg(&self.bridge.host)
            .arg("--port")
            .arg(self.bridge.port.to_string())
            .arg("--log-level")
            .arg(&self.worker.log_level)
            .env(APP_DATA_ENV, self.worker.resolved_data_dir())
            .env(WORKER_ADDR_ENV, self.bridge.address());

        debug!("Resolved {} worker launch: {}", mode, spec.command_line());
        Ok(spec)
    }

    /// `PYTHONPATH` with the source root prepended
    fn python_path_with(&self, source_root: &Path) -> Result<OsString, LaunchError> {
        let mut paths = vec![source_root.to_path_buf()];
        if let Some(existing) = &self.python_path {
            paths.extend(std::env::split_paths(existing).filter(|p| p != source_root));
        }

        std::env::join_paths(paths)
            .map_err(|e| LaunchError::Resolve(format!("invalid PYTHONPATH: {}", e)))
    }
}
