//! Worker pool execution loop
//!
//! One poll loop claims tasks while a slot is free and hands each claimed
//! task to its own tokio task. Every in-flight task is registered with its
//! cancellation token; whoever removes that entry first (the slot on
//! completion, or a stopping controller) records the terminal status, so
//! each task is finalized exactly once.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::WorkerPoolConfig;
use super::metrics::{MetricsRecorder, WorkerStatus};
use super::poller::TaskPoller;
use crate::handler::{HandlerContext, HandlerRegistry};
use crate::persistence::{Task, TaskStore};
use crate::reliability::execute_with_timeout;

/// Failure recorded when a handler succeeds without producing output
pub(crate) const NO_OUTPUT: &str = "task handler returned no output";

/// Tasks currently holding a slot, keyed by task ID
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    tokens: DashMap<Uuid, CancellationToken>,
}

impl InFlight {
    pub(crate) fn insert(&self, task_id: Uuid, token: CancellationToken) {
        self.tokens.insert(task_id, token);
    }

    /// Take ownership of finalizing `task_id`; `None` if someone else did
    pub(crate) fn release(&self, task_id: Uuid) -> Option<CancellationToken> {
        self.tokens.remove(&task_id).map(|(_, token)| token)
    }

    pub(crate) fn ids(&self) -> Vec<Uuid> {
        self.tokens.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Record the terminal status of a task and release its slot in the metrics
///
/// Returns the escalation reason when the failure streak just reached the
/// configured threshold.
pub(crate) async fn finalize(
    store: &dyn TaskStore,
    recorder: &MetricsRecorder,
    config: &WorkerPoolConfig,
    task_id: Uuid,
    outcome: Result<serde_json::Value, String>,
) -> Option<String> {
    let outcome = match outcome {
        Ok(serde_json::Value::Null) => Err(NO_OUTPUT.to_string()),
        other => other,
    };

    let error = match outcome {
        Ok(output) => match store.complete(task_id, output).await {
            Ok(_) => {
                debug!(%task_id, "Task completed");
                None
            }
            Err(e) => {
                error!(%task_id, "Failed to complete task: {}", e);
                let message = format!("failed to record output: {e}");
                if let Err(e) = store.fail(task_id, &message).await {
                    error!(%task_id, "Failed to fail task: {}", e);
                }
                Some(message)
            }
        },
        Err(message) => {
            debug!(%task_id, error = %message, "Task failed");
            if let Err(e) = store.fail(task_id, &message).await {
                error!(%task_id, "Failed to fail task: {}", e);
            }
            Some(message)
        }
    };

    let streak = recorder.task_finished(error.as_deref(), &config.escalation, Utc::now())?;
    let reason = format!(
        "worker stopped after {} consecutive task failures: {}",
        streak,
        error.as_deref().unwrap_or_default()
    );
    Some(reason)
}

/// A single run of the worker pool, from `start` to `stop`
pub(crate) struct WorkerPool {
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    config: WorkerPoolConfig,
    recorder: Arc<MetricsRecorder>,
    in_flight: Arc<InFlight>,
    slots: Arc<Semaphore>,
    escalation_tx: mpsc::UnboundedSender<String>,
}

impl WorkerPool {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        registry: HandlerRegistry,
        config: WorkerPoolConfig,
        recorder: Arc<MetricsRecorder>,
        in_flight: Arc<InFlight>,
        escalation_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            store,
            registry,
            config,
            recorder,
            in_flight,
            slots,
            escalation_tx,
        }
    }

    /// Claim and dispatch tasks until shutdown is signaled
    ///
    /// Returns once no further claim can happen; tasks already dispatched
    /// keep running on their own slots.
    #[instrument(skip_all, fields(worker_id = %self.config.worker_id))]
    pub(crate) async fn run(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) {
        let mut poller = TaskPoller::new(
            Arc::clone(&self.store),
            self.config.worker_id.clone(),
            self.config.poller.clone(),
            shutdown_rx,
        );
        let mut shutdown = poller.shutdown_receiver();

        info!(
            max_concurrency = self.config.max_concurrency,
            "Poll loop started"
        );

        loop {
            if poller.is_shutdown() {
                debug!("Poll loop: shutdown requested");
                break;
            }

            // Wait for a free slot before touching the store
            let permit = tokio::select! {
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if self.recorder.status() == WorkerStatus::Stopping {
                debug!("Poll loop: pool is stopping");
                break;
            }

            match poller.poll().await {
                Ok(Some(task)) => self.dispatch(task, permit),
                Ok(None) => {
                    drop(permit);
                    if poller.wait().await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Poll error: {}", e);
                    drop(permit);
                    if poller.wait().await {
                        break;
                    }
                }
            }
        }

        debug!("Poll loop exited");
    }

    fn dispatch(self: &Arc<Self>, task: Task, permit: OwnedSemaphorePermit) {
        let token = CancellationToken::new();
        self.recorder.task_claimed();
        self.in_flight.insert(task.id, token.clone());

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.execute(task, token).await;
            drop(permit);
        });
    }

    #[instrument(skip_all, fields(task_id = %task.id, object_id = %task.object_id))]
    async fn execute(&self, task: Task, token: CancellationToken) {
        let task_id = task.id;

        let outcome = match self.registry.resolve(&task) {
            Ok(handler) => {
                debug!(handler = handler.name(), "Executing task");
                let ctx = HandlerContext::for_task(&task, token);
                execute_with_timeout(handler, ctx, task.input, self.config.execution_timeout)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => {
                warn!("Cannot execute task: {}", e);
                Err(e.to_string())
            }
        };

        if self.in_flight.release(task_id).is_none() {
            debug!("Task already released by stopping worker");
            return;
        }

        let escalation = finalize(
            self.store.as_ref(),
            &self.recorder,
            &self.config,
            task_id,
            outcome,
        )
        .await;

        if let Some(reason) = escalation {
            warn!("Escalating task failures: {}", reason);
            let _ = self.escalation_tx.send(reason);
        }
    }
}
