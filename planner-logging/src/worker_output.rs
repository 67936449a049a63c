//! Forwarding of worker stdout/stderr lines

use std::fmt;
use std::sync::{Arc, Mutex};

/// Which stream of the worker process a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Receives worker output one line at a time
pub trait OutputSink: Send + Sync {
    fn line(&self, pid: Option<u32>, stream: OutputStream, line: &str);
}

/// Logs worker output under the `worker` target.
///
/// stdout goes out at `info`, stderr at `warn`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, pid: Option<u32>, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => {
                tracing::info!(target: crate::WORKER_TARGET, pid = ?pid, "{}", line)
            }
            OutputStream::Stderr => {
                tracing::warn!(target: crate::WORKER_TARGET, pid = ?pid, "{}", line)
            }
        }
    }
}

/// Discards worker output
#[derive(Debug, Clone, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _pid: Option<u32>, _stream: OutputStream, _line: &str) {}
}

/// Keeps worker output in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(OutputStream, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every captured line
    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Captured lines from one stream
    pub fn stream(&self, stream: OutputStream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line)
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, _pid: Option<u32>, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}
