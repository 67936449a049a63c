//! Worker lifecycle supervision
//!
//! One [`Supervisor`] owns one worker process. All lifecycle state lives
//! behind a single async mutex; long-running transitions (startup, stop) run
//! in spawned tasks that publish their outcome on `watch` channels, so every
//! caller interested in the same transition awaits the same result and a
//! cancelled caller never strands the state machine half way.

use crate::error::{StartupError, SupervisorError};
use crate::launcher::{wait_for_exit, ExitReport, LaunchSpec, Launcher, ProcessLauncher, WorkerHandle};
use crate::probe::{cancelled, ReadinessProbe};
use crate::resolve::LaunchResolver;
use planner_config::{PlannerConfig, SupervisorConfig};
use planner_http::types::{
    BoundaryInfo, CompiledMission, GridBuildRequest, GridSummary, HealthStatus,
    MissionCompileRequest, BOUNDARY_CACHE, GRID_BUILD, HEALTH, MISSION_COMPILE,
};
use planner_http::{BridgeSettings, HttpBridge, WorkerClient};
use planner_logging::{NullSink, OutputSink, TracingSink};
use planner_resilience::{RecoveryDecision, RecoveryPolicy, TerminationMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Starting,
    Ready,
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Ready => write!(f, "ready"),
            WorkerState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub state: WorkerState,
    pub pid: Option<u32>,
    /// Worker processes spawned so far
    pub spawns: u64,
    /// Restart cycles triggered by transient failures
    pub restarts: u64,
}

/// Timing and recovery policy
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    pub probe: ReadinessProbe,
    pub recovery: RecoveryPolicy,
    pub stop_timeout: Duration,
    pub reconcile_on_start: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            probe: ReadinessProbe::from(config),
            recovery: RecoveryPolicy::new(config.max_restarts_per_request),
            stop_timeout: config.stop_timeout,
            reconcile_on_start: config.reconcile_on_start,
        }
    }
}

type StartOutcome = Option<Result<(), StartupError>>;

struct LiveWorker {
    generation: u64,
    handle: WorkerHandle,
}

struct Lifecycle {
    state: WorkerState,
    worker: Option<LiveWorker>,
    /// The in-flight start, while `Starting`
    start_op: Option<watch::Receiver<StartOutcome>>,
    /// The in-flight stop, while `Stopping`
    stop_op: Option<watch::Receiver<bool>>,
    next_generation: u64,
    /// Latest generation already counted as restarted
    restarted_generation: u64,
    shutting_down: bool,
}

struct Inner {
    launcher: Arc<dyn Launcher>,
    client: Arc<dyn WorkerClient>,
    launch: LaunchSpec,
    options: SupervisorOptions,
    lifecycle: Mutex<Lifecycle>,
    cancel_tx: watch::Sender<bool>,
    spawns: AtomicU64,
    restarts: AtomicU64,
}

enum Pending {
    Start(watch::Receiver<StartOutcome>),
    Stop(watch::Receiver<bool>),
}

/// Owner of the worker process lifecycle
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(
        launcher: Arc<dyn Launcher>,
        client: Arc<dyn WorkerClient>,
        launch: LaunchSpec,
        options: SupervisorOptions,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                launcher,
                client,
                launch,
                options,
                lifecycle: Mutex::new(Lifecycle {
                    state: WorkerState::Idle,
                    worker: None,
                    start_op: None,
                    stop_op: None,
                    next_generation: 1,
                    restarted_generation: 0,
                    shutting_down: false,
                }),
                cancel_tx,
                spawns: AtomicU64::new(0),
                restarts: AtomicU64::new(0),
            }),
        }
    }

    /// Supervisor for a real worker process, resolved from configuration
    pub fn from_config(config: &PlannerConfig) -> Result<Self, SupervisorError> {
        let sink: Arc<dyn OutputSink> = if config.logging.forward_worker_output {
            Arc::new(TracingSink)
        } else {
            Arc::new(NullSink)
        };
        Self::from_config_with_sink(config, sink)
    }

    /// Like [`Supervisor::from_config`] with a custom worker output sink
    pub fn from_config_with_sink(
        config: &PlannerConfig,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, SupervisorError> {
        let launch = LaunchResolver::from_config(config)
            .resolve()
            .map_err(StartupError::from)?;
        let bridge =
            HttpBridge::new(BridgeSettings::from(&config.bridge)).map_err(SupervisorError::Protocol)?;

        Ok(Self::new(
            Arc::new(ProcessLauncher::new(sink)),
            Arc::new(bridge),
            launch,
            SupervisorOptions::from(&config.supervisor),
        ))
    }

    /// Current lifecycle state
    pub async fn state(&self) -> WorkerState {
        self.inner.lifecycle.lock().await.state
    }

    pub async fn stats(&self) -> SupervisorStats {
        let lifecycle = self.inner.lifecycle.lock().await;
        SupervisorStats {
            state: lifecycle.state,
            pid: lifecycle.worker.as_ref().and_then(|w| w.handle.pid()),
            spawns: self.inner.spawns.load(Ordering::SeqCst),
            restarts: self.inner.restarts.load(Ordering::SeqCst),
        }
    }

    /// Bring the worker to `Ready`.
    ///
    /// Concurrent callers share a single start operation and all observe its
    /// outcome. Startup is never retried automatically.
    pub async fn start(&self) -> Result<(), StartupError> {
        self.ensure_ready().await.map(|_| ())
    }

    /// Wait until the worker is `Ready` and return its generation, read
    /// under the same lock that observed `Ready`.
    async fn ensure_ready(&self) -> Result<u64, StartupError> {
        loop {
            let pending = {
                let mut lifecycle = self.inner.lifecycle.lock().await;
                if lifecycle.shutting_down {
                    return Err(StartupError::ShuttingDown);
                }

                let state = lifecycle.state;
                match state {
                    WorkerState::Ready => match &lifecycle.worker {
                        Some(worker) => return Ok(worker.generation),
                        None => return Err(StartupError::Aborted),
                    },
                    WorkerState::Starting => match &lifecycle.start_op {
                        Some(op) => Pending::Start(op.clone()),
                        None => return Err(StartupError::Aborted),
                    },
                    WorkerState::Stopping => match &lifecycle.stop_op {
                        Some(op) => Pending::Stop(op.clone()),
                        None => return Err(StartupError::Aborted),
                    },
                    WorkerState::Idle => {
                        let (tx, rx) = watch::channel(None);
                        lifecycle.state = WorkerState::Starting;
                        lifecycle.start_op = Some(rx.clone());
                        info!("Starting worker: {}", self.inner.launch.command_line());
                        tokio::spawn(Inner::run_start(self.inner.clone(), tx));
                        Pending::Start(rx)
                    }
                }
            };

            // Either way the state is re-read: a restart may already have
            // moved a freshly started worker on to `Stopping`
            match pending {
                Pending::Start(rx) => start_outcome(rx).await?,
                Pending::Stop(rx) => stop_finished(rx).await,
            }
        }
    }

    /// Stop the worker. Never fails; a no-op when idle.
    pub async fn stop(&self) {
        loop {
            let pending = {
                let mut lifecycle = self.inner.lifecycle.lock().await;
                let state = lifecycle.state;
                match state {
                    WorkerState::Idle => return,
                    WorkerState::Starting => match &lifecycle.start_op {
                        Some(op) => Pending::Start(op.clone()),
                        None => return,
                    },
                    WorkerState::Stopping => match &lifecycle.stop_op {
                        Some(op) => Pending::Stop(op.clone()),
                        None => return,
                    },
                    WorkerState::Ready => match self.inner.begin_stop(&mut lifecycle) {
                        Some(rx) => Pending::Stop(rx),
                        None => return,
                    },
                }
            };

            match pending {
                // Let the start resolve, then stop whatever it produced
                Pending::Start(rx) => {
                    let _ = start_outcome(rx).await;
                }
                Pending::Stop(rx) => {
                    stop_finished(rx).await;
                    return;
                }
            }
        }
    }

    /// Stop for application exit: refuse new starts, abort a pending
    /// startup, then stop.
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if !lifecycle.shutting_down {
                info!("Supervisor shutting down (state: {})", lifecycle.state);
            }
            lifecycle.shutting_down = true;
        }
        self.inner.cancel_tx.send_replace(true);
        self.stop().await;
    }

    /// Send a request to the worker, starting it first when needed.
    ///
    /// Transient failures restart the worker and retry, within the
    /// configured restart budget.
    pub async fn request(
        &self,
        endpoint: &str,
        payload: Option<&JsonValue>,
    ) -> Result<JsonValue, SupervisorError> {
        let mut restarts_used = 0;

        loop {
            let generation = self.ensure_ready().await?;

            let err = match self.inner.client.call(endpoint, payload).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.inner.options.recovery.decide(&err, restarts_used) {
                RecoveryDecision::Surface => return Err(SupervisorError::from(err)),
                RecoveryDecision::Restart => {
                    restarts_used += 1;
                    self.restart_generation(generation).await;
                }
            }
        }
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, SupervisorError> {
        let value = self.request(HEALTH, None).await?;
        decode(value)
    }

    /// `POST /grid/build`
    pub async fn build_grid(&self, cell_size: f64) -> Result<GridSummary, SupervisorError> {
        let request = GridBuildRequest::new(cell_size);
        request.validate().map_err(SupervisorError::Domain)?;
        self.post(GRID_BUILD, &request).await
    }

    /// `POST /mission/compile`
    pub async fn compile_mission(
        &self,
        request: &MissionCompileRequest,
    ) -> Result<CompiledMission, SupervisorError> {
        request.validate().map_err(SupervisorError::Domain)?;
        self.post(MISSION_COMPILE, request).await
    }

    /// `POST /boundary/cache`
    pub async fn cache_boundary(&self) -> Result<BoundaryInfo, SupervisorError> {
        self.post(BOUNDARY_CACHE, &json!({})).await
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, SupervisorError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(body).map_err(SupervisorError::decode)?;
        let value = self.request(endpoint, Some(&payload)).await?;
        decode(value)
    }

    /// Stop the worker generation that produced a transient failure.
    ///
    /// A newer generation means another caller already restarted it.
    async fn restart_generation(&self, generation: u64) {
        let pending = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            let current = lifecycle.worker.as_ref().map(|w| w.generation);
            let last_launched = lifecycle.next_generation - 1;
            let counted = lifecycle.restarted_generation >= generation;
            let state = lifecycle.state;

            match state {
                WorkerState::Ready if current == Some(generation) => {
                    lifecycle.restarted_generation = generation;
                    self.inner.restarts.fetch_add(1, Ordering::SeqCst);
                    info!("Restarting worker generation {}", generation);
                    self.inner.begin_stop(&mut lifecycle)
                }
                WorkerState::Idle if generation == last_launched && !counted => {
                    // Already exited; the next start() is the restart
                    lifecycle.restarted_generation = generation;
                    self.inner.restarts.fetch_add(1, Ordering::SeqCst);
                    None
                }
                _ => {
                    debug!("Worker generation {} already replaced", generation);
                    None
                }
            }
        };

        if let Some(rx) = pending {
            stop_finished(rx).await;
        }
    }
}

impl Inner {
    /// Single start operation: launch, probe, reconcile, promote
    async fn run_start(self: Arc<Self>, tx: watch::Sender<StartOutcome>) {
        let result = match self.launch_and_probe().await {
            Ok(generation) => self.promote(generation).await,
            Err(err) => Err(err),
        };

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Worker startup failed: {}", err);
                self.abandon_start().await;
                Err(err)
            }
        };

        tx.send_replace(Some(outcome));
    }

    async fn launch_and_probe(self: &Arc<Self>) -> Result<u64, StartupError> {
        let handle = self.launcher.launch(&self.launch).await?;
        self.spawns.fetch_add(1, Ordering::SeqCst);

        let pid = handle.pid();
        let exit_rx = handle.exit_watcher();

        let generation = {
            let mut lifecycle = self.lifecycle.lock().await;
            let generation = lifecycle.next_generation;
            lifecycle.next_generation += 1;
            lifecycle.worker = Some(LiveWorker { generation, handle });
            generation
        };

        tokio::spawn(monitor_exit(
            Arc::downgrade(self),
            generation,
            exit_rx.clone(),
            pid,
        ));

        let mut cancel_rx = self.cancel_tx.subscribe();

        tokio::select! {
            ready = self.options.probe.await_ready(self.client.as_ref(), &mut cancel_rx) => {
                ready?;
            }
            report = wait_for_exit(exit_rx, pid) => {
                return Err(StartupError::ExitedDuringStartup(report));
            }
        }

        if self.options.reconcile_on_start {
            let body = json!({});
            tokio::select! {
                _ = cancelled(&mut cancel_rx) => return Err(StartupError::Cancelled),
                result = self.client.call(BOUNDARY_CACHE, Some(&body)) => {
                    if let Err(e) = result {
                        warn!("Boundary cache reconciliation failed: {}", e);
                    }
                }
            }
        }

        Ok(generation)
    }

    /// `Starting -> Ready`, unless the process died or shutdown began meanwhile
    async fn promote(&self, generation: u64) -> Result<(), StartupError> {
        let mut lifecycle = self.lifecycle.lock().await;

        if lifecycle.shutting_down {
            return Err(StartupError::Cancelled);
        }

        let exited = match &lifecycle.worker {
            Some(worker) if worker.generation == generation => worker.handle.exit_report(),
            _ => Some(ExitReport::unknown(None)),
        };
        if let Some(report) = exited {
            return Err(StartupError::ExitedDuringStartup(report));
        }

        let pid = lifecycle.worker.as_ref().and_then(|w| w.handle.pid());
        lifecycle.state = WorkerState::Ready;
        lifecycle.start_op = None;
        info!("Worker ready (pid {:?}, generation {})", pid, generation);
        Ok(())
    }

    /// Terminate whatever the failed start left behind, then go `Idle`
    async fn abandon_start(&self) {
        let worker = self.lifecycle.lock().await.worker.take();

        if let Some(worker) = worker {
            self.terminate(worker).await;
        }

        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.state = WorkerState::Idle;
        lifecycle.start_op = None;
    }

    /// `Ready -> Stopping`, with the stop running in its own task
    fn begin_stop(self: &Arc<Self>, lifecycle: &mut Lifecycle) -> Option<watch::Receiver<bool>> {
        let Some(worker) = lifecycle.worker.take() else {
            lifecycle.state = WorkerState::Idle;
            return None;
        };

        let (tx, rx) = watch::channel(false);
        lifecycle.state = WorkerState::Stopping;
        lifecycle.stop_op = Some(rx.clone());

        let inner = self.clone();
        tokio::spawn(async move {
            inner.terminate(worker).await;
            {
                let mut lifecycle = inner.lifecycle.lock().await;
                lifecycle.state = WorkerState::Idle;
                lifecycle.stop_op = None;
            }
            tx.send_replace(true);
        });

        Some(rx)
    }

    /// Signal the process and wait for it, at most `stop_timeout`
    async fn terminate(&self, worker: LiveWorker) {
        let timeout = self.options.stop_timeout;
        let pid = worker.handle.pid();

        if worker.handle.has_exited() {
            debug!("Worker {:?} already exited", pid);
            return;
        }

        info!("Stopping worker {:?}", pid);
        worker
            .handle
            .terminate(TerminationMode::Graceful { kill_after: timeout });

        match tokio::time::timeout(timeout, worker.handle.wait()).await {
            Ok(report) => debug!("Worker {:?} stopped ({})", pid, report),
            Err(_) => warn!(
                "Worker {:?} did not exit within {:?}, no longer waiting",
                pid, timeout
            ),
        }
    }
}

/// Marks the supervisor `Idle` when its ready worker dies
async fn monitor_exit(
    inner: Weak<Inner>,
    generation: u64,
    exit_rx: watch::Receiver<Option<ExitReport>>,
    pid: Option<u32>,
) {
    let report = wait_for_exit(exit_rx, pid).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };

    let mut lifecycle = inner.lifecycle.lock().await;
    let current = lifecycle
        .worker
        .as_ref()
        .is_some_and(|w| w.generation == generation);

    if current && lifecycle.state == WorkerState::Ready {
        warn!(
            "Worker {:?} exited unexpectedly ({}), marking idle",
            pid, report
        );
        lifecycle.worker = None;
        lifecycle.state = WorkerState::Idle;
    } else {
        debug!("Worker generation {} exited ({})", generation, report);
    }
}

async fn start_outcome(mut rx: watch::Receiver<StartOutcome>) -> Result<(), StartupError> {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(Err(StartupError::Aborted)),
        Err(_) => Err(StartupError::Aborted),
    }
}

async fn stop_finished(mut rx: watch::Receiver<bool>) {
    // A dropped sender means the stop task is gone, which also ends the wait
    let _ = rx.wait_for(|done| *done).await;
}

fn decode<T: DeserializeOwned>(value: JsonValue) -> Result<T, SupervisorError> {
    serde_json::from_value(value).map_err(SupervisorError::decode)
}
