//! Readiness probe

use crate::error::ProbeError;
use planner_config::SupervisorConfig;
use planner_http::WorkerClient;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Polls the worker's health endpoint until it answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for ReadinessProbe {
    fn from(config: &SupervisorConfig) -> Self {
        Self::new(config.probe_attempts, config.probe_interval)
    }
}

impl ReadinessProbe {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Wait for the first healthy response.
    ///
    /// Returns the attempt that succeeded. A `true` on `cancel` aborts the
    /// wait at the next await point.
    pub async fn await_ready(
        &self,
        client: &dyn WorkerClient,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<u32, ProbeError> {
        for attempt in 1..=self.max_attempts {
            let healthy = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(ProbeError::Cancelled),
                result = client.health() => match result {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Health check {}/{} failed: {}", attempt, self.max_attempts, e);
                        false
                    }
                },
            };

            if healthy {
                info!("Worker healthy after {} attempt(s)", attempt);
                return Ok(attempt);
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    biased;
                    _ = cancelled(cancel) => return Err(ProbeError::Cancelled),
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        Err(ProbeError::Timeout {
            attempts: self.max_attempts,
        })
    }
}

/// Resolves once cancellation is signalled; never if the sender goes away
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
