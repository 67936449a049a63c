//! Worker process termination

use log::{error, info, warn};
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Child;
use tokio::time::timeout;

/// How long to wait for a force-killed process to be reaped
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shutdown errors
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The termination signal could not be delivered
    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    /// Waiting on or killing the process failed
    #[error("Process I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The process survived a force kill
    #[error("Process unresponsive to termination")]
    Unresponsive,
}

/// How a process is asked to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMode {
    /// Termination signal first, force kill once `kill_after` elapses
    Graceful { kill_after: Duration },
    /// Immediate force kill
    Force,
}

/// Process shutdown helper
pub struct ProcessShutdownManager;

impl ProcessShutdownManager {
    /// Send the platform's polite termination request.
    ///
    /// SIGTERM on Unix. Windows has no equivalent for console-less children,
    /// so the process is killed outright there.
    pub fn request_termination(child: &mut Child) -> Result<(), ShutdownError> {
        let Some(pid) = child.id() else {
            // Already reaped
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
                ShutdownError::Signal {
                    pid,
                    message: e.to_string(),
                }
            })
        }

        #[cfg(not(unix))]
        {
            warn!("No graceful termination available, killing process {}", pid);
            child.start_kill().map_err(ShutdownError::from)
        }
    }

    /// Shut a process down, escalating to a force kill when it lingers
    pub async fn shutdown_process(
        child: &mut Child,
        mode: TerminationMode,
    ) -> Result<ExitStatus, ShutdownError> {
        if let TerminationMode::Graceful { kill_after } = mode {
            if let Some(id) = child.id() {
                info!("Initiating graceful shutdown for process {}", id);
            }

            if let Err(e) = Self::request_termination(child) {
                warn!("{}", e);
            }

            match timeout(kill_after, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("Process terminated gracefully with status: {:?}", status);
                    return Ok(status);
                }
                Ok(Err(e)) => {
                    error!("Error waiting for process: {}", e);
                }
                Err(_) => {
                    warn!(
                        "Process did not terminate within {:?}, forcing",
                        kill_after
                    );
                }
            }
        }

        if let Err(e) = child.start_kill() {
            // Exited between the wait and the kill
            if let Ok(Some(status)) = child.try_wait() {
                return Ok(status);
            }
            error!("Failed to kill process: {}", e);
            return Err(ShutdownError::Io(e));
        }

        match timeout(KILL_REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Process terminated forcefully with status: {:?}", status);
                Ok(status)
            }
            Ok(Err(e)) => {
                error!("Error waiting for killed process: {}", e);
                Err(ShutdownError::Io(e))
            }
            Err(_) => {
                error!("Process did not terminate even after force kill");
                Err(ShutdownError::Unresponsive)
            }
        }
    }
}
