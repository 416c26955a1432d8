//! Worker lifecycle controller
//!
//! Owns the pool lifecycle (`stopped -> starting -> running -> stopping ->
//! stopped`) and the metrics recorder. Each `start` spawns a fresh
//! [`WorkerPool`] run; `stop` halts claiming, drains in-flight tasks for up
//! to the shutdown timeout and force-fails whatever is left.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::config::WorkerPoolConfig;
use super::metrics::{MetricsRecorder, WorkerMetrics, WorkerStatus};
use super::pool::{finalize, InFlight, WorkerPool};
use crate::handler::HandlerRegistry;
use crate::persistence::{StoreError, TaskStore};
use crate::reliability::WORKER_STOPPED;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Controller errors
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("worker is already running")]
    AlreadyRunning,

    #[error("worker is already stopped")]
    AlreadyStopped,

    /// `stop` while a start is in progress
    #[error("worker is starting")]
    Starting,

    /// `start` while a stop is draining
    #[error("worker is stopping")]
    Stopping,

    #[error("invalid worker configuration: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ControllerError {
    /// Lifecycle no-ops and conflicts, as opposed to real failures
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning | Self::AlreadyStopped | Self::Starting | Self::Stopping
        )
    }
}

struct PoolRun {
    shutdown_tx: watch::Sender<bool>,
    poll_handle: JoinHandle<()>,
}

struct ControllerInner {
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    config: WorkerPoolConfig,
    recorder: Arc<MetricsRecorder>,
    in_flight: Arc<InFlight>,
    run: Mutex<Option<PoolRun>>,
}

/// Public lifecycle control and metrics for a worker pool
///
/// Cheap to clone; clones control the same pool. Counters persist across
/// stop/start cycles and reset only when a new controller is built.
///
/// # Example
///
/// ```ignore
/// use noscope_durable::prelude::*;
///
/// let controller = WorkerController::new(store, registry, WorkerPoolConfig::default());
/// controller.start().await?;
/// let metrics = controller.metrics();
/// controller.stop().await?;
/// ```
#[derive(Clone)]
pub struct WorkerController {
    inner: Arc<ControllerInner>,
}

impl WorkerController {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: HandlerRegistry,
        config: WorkerPoolConfig,
    ) -> Self {
        let recorder = Arc::new(MetricsRecorder::new(config.max_concurrency));
        Self {
            inner: Arc::new(ControllerInner {
                store,
                registry,
                config,
                recorder,
                in_flight: Arc::new(InFlight::default()),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start claiming and executing tasks
    pub async fn start(&self) -> Result<(), ControllerError> {
        self.inner.start()
    }

    /// Stop claiming, drain in-flight tasks, then report `stopped`
    pub async fn stop(&self) -> Result<(), ControllerError> {
        self.inner.stop().await
    }

    /// Consistent snapshot of status and counters
    pub fn metrics(&self) -> WorkerMetrics {
        self.inner.recorder.snapshot()
    }

    pub fn status(&self) -> WorkerStatus {
        self.inner.recorder.status()
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }
}

impl std::fmt::Debug for WorkerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerController")
            .field("worker_id", &self.inner.config.worker_id)
            .field("status", &self.status())
            .finish()
    }
}

impl ControllerInner {
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    fn start(self: &Arc<Self>) -> Result<(), ControllerError> {
        self.recorder.begin_start()?;

        if let Err(e) = self.validate() {
            self.recorder.mark_stopped();
            warn!("Refusing to start worker: {}", e);
            return Err(e);
        }

        info!(
            max_concurrency = self.config.max_concurrency,
            handlers = self.registry.len(),
            "Starting worker pool"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (escalation_tx, escalation_rx) = mpsc::unbounded_channel();

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.store),
            self.registry.clone(),
            self.config.clone(),
            Arc::clone(&self.recorder),
            Arc::clone(&self.in_flight),
            escalation_tx,
        ));
        let poll_handle = tokio::spawn(pool.run(shutdown_rx));
        *self.run.lock() = Some(PoolRun {
            shutdown_tx,
            poll_handle,
        });

        tokio::spawn(supervise(Arc::clone(self), escalation_rx));

        self.recorder.mark_running(Utc::now());
        info!("Worker pool running");
        Ok(())
    }

    fn validate(&self) -> Result<(), ControllerError> {
        self.config.validate().map_err(ControllerError::InvalidConfig)?;
        if self.registry.is_empty() {
            return Err(ControllerError::InvalidConfig(
                "no task handlers registered".into(),
            ));
        }
        Ok(())
    }

    /// The drain runs on its own task and finishes even if the caller
    /// stops waiting
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    async fn stop(self: &Arc<Self>) -> Result<(), ControllerError> {
        self.recorder.begin_stop()?;
        info!("Stopping worker pool");

        let inner = Arc::clone(self);
        let drain = tokio::spawn(async move { inner.shut_down().await });
        if let Err(e) = drain.await {
            error!("Worker drain terminated abnormally: {}", e);
            self.recorder.mark_stopped();
        }
        Ok(())
    }

    /// `stopping -> stopped`: halt claims, drain, force-fail leftovers
    async fn shut_down(&self) {
        // Once the poll loop has exited no new task can be claimed
        let run = self.run.lock().take();
        if let Some(run) = run {
            let _ = run.shutdown_tx.send(true);
            if let Err(e) = run.poll_handle.await {
                error!("Poll loop terminated abnormally: {}", e);
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let mut forced = false;
        loop {
            let remaining = self.recorder.current_tasks();
            if remaining == 0 {
                debug!("All tasks drained");
                break;
            }

            // Slots that released their task before the deadline are still
            // recording its outcome; wait for them after forcing the rest
            if !forced && tokio::time::Instant::now() >= deadline {
                warn!(remaining_tasks = remaining, "Shutdown timeout reached");
                self.force_release().await;
                forced = true;
                continue;
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.recorder.mark_stopped();
        info!("Worker pool stopped");
    }

    /// Fail every task still holding a slot and free the slot
    async fn force_release(&self) {
        for task_id in self.in_flight.ids() {
            let Some(token) = self.in_flight.release(task_id) else {
                continue;
            };
            token.cancel();
            warn!(%task_id, "Failing task still in flight at stop");
            finalize(
                self.store.as_ref(),
                &self.recorder,
                &self.config,
                task_id,
                Err(WORKER_STOPPED.to_string()),
            )
            .await;
        }
        debug!(in_flight = self.in_flight.len(), "Released in-flight tasks");
    }
}

/// Finish stopping the pool once a run of failures reached the threshold
///
/// The recorder has already moved the pool to `stopping` when the reason
/// arrives.
async fn supervise(inner: Arc<ControllerInner>, mut escalation_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(reason) = escalation_rx.recv().await {
        error!(worker_id = %inner.config.worker_id, "{}", reason);
        inner.shut_down().await;
        inner.recorder.record_error(reason, Utc::now());
    }
}
