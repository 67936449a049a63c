//! Worker process launching and exit observation

use crate::error::LaunchError;
use planner_logging::{OutputSink, OutputStream, TracingSink};
use planner_resilience::{ProcessShutdownManager, TerminationMode};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Everything needed to start the worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added to (or replacing entries of) the inherited environment
    pub env: BTreeMap<String, OsString>,
    pub current_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program and arguments as a single display string
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// How the worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: Option<u32>,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReport {
    pub fn from_status(pid: Option<u32>, status: &ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            pid,
            code: status.code(),
            signal,
        }
    }

    pub fn with_code(pid: Option<u32>, code: i32) -> Self {
        Self {
            pid,
            code: Some(code),
            signal: None,
        }
    }

    pub fn with_signal(pid: Option<u32>, signal: i32) -> Self {
        Self {
            pid,
            code: None,
            signal: Some(signal),
        }
    }

    /// The process is gone but its status could not be collected
    pub fn unknown(pid: Option<u32>) -> Self {
        Self {
            pid,
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// The supervisor's side of a running worker process
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitReport>>,
    terminate_tx: mpsc::UnboundedSender<TerminationMode>,
}

/// The process side of a [`WorkerHandle`]: receives termination requests and
/// publishes the exit.
///
/// Dropping every handle counts as a force-kill request.
#[derive(Debug)]
pub struct WorkerSignals {
    pid: Option<u32>,
    exit_tx: watch::Sender<Option<ExitReport>>,
    terminate_rx: mpsc::UnboundedReceiver<TerminationMode>,
}

impl WorkerHandle {
    /// Create a connected handle/signals pair
    pub fn channel(pid: Option<u32>) -> (WorkerHandle, WorkerSignals) {
        let (exit_tx, exit_rx) = watch::channel(None);
        let (terminate_tx, terminate_rx) = mpsc::unbounded_channel();

        (
            WorkerHandle {
                pid,
                exit_rx,
                terminate_tx,
            },
            WorkerSignals {
                pid,
                exit_tx,
                terminate_rx,
            },
        )
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit report, once the process has ended
    pub fn exit_report(&self) -> Option<ExitReport> {
        self.exit_rx.borrow().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// A receiver that observes the exit independently of this handle
    pub fn exit_watcher(&self) -> watch::Receiver<Option<ExitReport>> {
        self.exit_rx.clone()
    }

    /// Ask the process to exit without waiting for it
    pub fn terminate(&self, mode: TerminationMode) {
        if self.terminate_tx.send(mode).is_err() {
            debug!("Worker {:?} already gone, termination request dropped", self.pid);
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&self) -> ExitReport {
        wait_for_exit(self.exit_watcher(), self.pid).await
    }
}

impl WorkerSignals {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next termination request; `Force` once every handle is dropped
    pub async fn next_termination(&mut self) -> TerminationMode {
        self.terminate_rx
            .recv()
            .await
            .unwrap_or(TerminationMode::Force)
    }

    /// Publish the exit to every observer
    pub fn report_exit(self, report: ExitReport) {
        self.exit_tx.send_replace(Some(report));
    }
}

/// Resolve once the exit report on `rx` is published
pub async fn wait_for_exit(
    mut rx: watch::Receiver<Option<ExitReport>>,
    pid: Option<u32>,
) -> ExitReport {
    match rx.wait_for(Option::is_some).await {
        Ok(report) => report.clone().unwrap_or_else(|| ExitReport::unknown(pid)),
        // Observer dropped without reporting: the process is no longer tracked
        Err(_) => ExitReport::unknown(pid),
    }
}

/// Starts worker processes
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<WorkerHandle, LaunchError>;
}

/// Launches the worker as an OS process
pub struct ProcessLauncher {
    sink: Arc<dyn OutputSink>,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl ProcessLauncher {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }
}

#[async_trait::async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<WorkerHandle, LaunchError> {
        debug!("Spawning worker process: {}", spec.command_line());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let program = spec.program.display().to_string();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound {
                program: program.clone(),
            },
            _ => LaunchError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            },
        })?;

        let pid = child.id();
        info!("Worker process started: pid {:?} ({})", pid, program);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(
                stdout,
                pid,
                OutputStream::Stdout,
                self.sink.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(
                stderr,
                pid,
                OutputStream::Stderr,
                self.sink.clone(),
            ));
        }

        let (handle, signals) = WorkerHandle::channel(pid);
        tokio::spawn(watch_process(child, signals));

        Ok(handle)
    }
}

/// Owns the child until it exits, serving termination requests meanwhile
async fn watch_process(mut child: Child, mut signals: WorkerSignals) {
    let pid = signals.pid();

    let outcome = tokio::select! {
        status = child.wait() => status.map_err(|e| e.to_string()),
        mode = signals.next_termination() => {
            debug!("Terminating worker {:?} ({:?})", pid, mode);
            ProcessShutdownManager::shutdown_process(&mut child, mode)
                .await
                .map_err(|e| e.to_string())
        }
    };

    let report = match outcome {
        Ok(status) => ExitReport::from_status(pid, &status),
        Err(e) => {
            error!("Lost track of worker {:?}: {}", pid, e);
            ExitReport::unknown(pid)
        }
    };

    if report.success() {
        info!("Worker {:?} exited ({})", pid, report);
    } else {
        warn!("Worker {:?} exited ({})", pid, report);
    }

    signals.report_exit(report);
}

/// Forward one output stream line by line
async fn forward_output<R>(
    reader: R,
    pid: Option<u32>,
    stream: OutputStream,
    sink: Arc<dyn OutputSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Worker {:?} {} closed", pid, stream);
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                sink.line(pid, stream, line.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                warn!("Failed to read worker {:?} {}: {}", pid, stream, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_logging::MemorySink;
    use std::time::Duration;

    #[test]
    fn test_launch_spec_builder() {
        let spec = LaunchSpec::new("python3")
            .arg("-m")
            .arg("server.main")
            .env("FL_MISSION_WORKER_ADDR", "127.0.0.1:8765")
            .current_dir("/srv/planner");

        assert_eq!(spec.command_line(), "python3 -m server.main");
        assert_eq!(
            spec.env.get("FL_MISSION_WORKER_ADDR"),
            Some(&OsString::from("127.0.0.1:8765"))
        );
        assert_eq!(spec.current_dir, Some(PathBuf::from("/srv/planner")));
    }

    #[test]
    fn test_exit_report_display() {
        assert_eq!(ExitReport::with_code(Some(1), 0).to_string(), "exit code 0");
        assert_eq!(ExitReport::with_signal(None, 9).to_string(), "signal 9");
        assert_eq!(ExitReport::unknown(None).to_string(), "unknown status");
        assert!(ExitReport::with_code(None, 0).success());
        assert!(!ExitReport::with_signal(None, 15).success());
    }

    #[tokio::test]
    async fn test_handle_channel_reports_exit() {
        let (handle, mut signals) = WorkerHandle::channel(Some(7));
        assert!(!handle.has_exited());

        handle.terminate(TerminationMode::Force);
        assert_eq!(signals.next_termination().await, TerminationMode::Force);
        signals.report_exit(ExitReport::with_signal(Some(7), 9));

        assert_eq!(handle.wait().await, ExitReport::with_signal(Some(7), 9));
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_dropped_handle_requests_force() {
        let (handle, mut signals) = WorkerHandle::channel(None);
        drop(handle);
        assert_eq!(signals.next_termination().await, TerminationMode::Force);
    }

    #[tokio::test]
    async fn test_dropped_signals_count_as_exit() {
        let (handle, signals) = WorkerHandle::channel(Some(3));
        drop(signals);
        assert_eq!(handle.wait().await, ExitReport::unknown(Some(3)));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let launcher = ProcessLauncher::default();
        let err = launcher
            .launch(&LaunchSpec::new("/nonexistent/fl-mission-worker"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_forwarded_and_exit_observed() {
        let sink = MemorySink::new();
        let launcher = ProcessLauncher::new(Arc::new(sink.clone()));

        let spec = LaunchSpec::new("sh")
            .arg("-c")
            .arg("echo \"addr=$FL_MISSION_WORKER_ADDR\"; echo oops >&2; exit 3")
            .env("FL_MISSION_WORKER_ADDR", "127.0.0.1:9999");

        let handle = launcher.launch(&spec).await.unwrap();
        assert!(handle.pid().is_some());

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(report.code, Some(3));

        // Output readers finish independently of the exit watcher
        for _ in 0..50 {
            if sink.lines().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            sink.stream(OutputStream::Stdout),
            vec!["addr=127.0.0.1:9999".to_string()]
        );
        assert_eq!(sink.stream(OutputStream::Stderr), vec!["oops".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_termination_request() {
        let launcher = ProcessLauncher::new(Arc::new(planner_logging::NullSink));
        let spec = LaunchSpec::new("sh").arg("-c").arg("exec sleep 30");

        let handle = launcher.launch(&spec).await.unwrap();
        handle.terminate(TerminationMode::Graceful {
            kill_after: Duration::from_secs(5),
        });

        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(report.signal, Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_directory_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new();
        let launcher = ProcessLauncher::new(Arc::new(sink.clone()));

        let spec = LaunchSpec::new("sh")
            .arg("-c")
            .arg("pwd")
            .current_dir(dir.path());
        let handle = launcher.launch(&spec).await.unwrap();
        handle.wait().await;

        for _ in 0..50 {
            if !sink.lines().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let printed = PathBuf::from(&sink.stream(OutputStream::Stdout)[0]);
        assert_eq!(
            printed.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
