//! Task polling with exponential backoff
//!
//! Claims one task at a time and backs off while the queue is empty.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, trace, warn};

use super::config::duration_millis;
use crate::persistence::{StoreError, Task, TaskStore};

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Minimum poll interval (first wait after an empty claim)
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Maximum poll interval (when idle)
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier when no tasks found
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl PollerConfig {
    /// Create a new poller configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum poll interval
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }
}

/// Task poller with adaptive backoff
///
/// Waits the minimum interval after the first empty claim, growing by the
/// multiplier up to the maximum, and resets as soon as a task is claimed.
pub struct TaskPoller {
    store: Arc<dyn TaskStore>,
    worker_id: String,
    config: PollerConfig,
    current_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskPoller {
    /// Create a new task poller
    pub fn new(
        store: Arc<dyn TaskStore>,
        worker_id: String,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            worker_id,
            current_interval: config.min_interval,
            config,
            shutdown_rx,
        }
    }

    /// Claim the next pending task
    ///
    /// Returns `None` without touching the store once shutdown is requested.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn poll(&mut self) -> Result<Option<Task>, StoreError> {
        if self.is_shutdown() {
            debug!("Poller shutdown requested");
            return Ok(None);
        }

        match self.store.claim_next().await {
            Ok(Some(task)) => {
                self.reset_backoff();
                debug!(task_id = %task.id, "Claimed task");
                Ok(Some(task))
            }
            Ok(None) => {
                trace!(
                    interval_ms = self.current_interval.as_millis(),
                    "No tasks found, backing off"
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Claim failed, backing off: {}", e);
                Err(e)
            }
        }
    }

    /// Wait for the current backoff interval, then grow it
    ///
    /// Returns true if shutdown was signaled.
    pub async fn wait(&mut self) -> bool {
        if self.is_shutdown() {
            return true;
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.current_interval) => false,
            _ = shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        };
        self.increase_backoff();
        interrupted
    }

    /// Get the current poll interval
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Receiver observing the same shutdown signal
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    fn reset_backoff(&mut self) {
        self.current_interval = self.config.min_interval;
    }

    fn increase_backoff(&mut self) {
        let new_interval = Duration::from_secs_f64(
            self.current_interval.as_secs_f64() * self.config.backoff_multiplier,
        );
        self.current_interval = new_interval.min(self.config.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryTaskStore, NewTask};
    use serde_json::json;

    fn poller(store: Arc<InMemoryTaskStore>) -> (TaskPoller, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_millis(40))
            .with_backoff_multiplier(2.0);
        (TaskPoller::new(store, "w1".into(), config, rx), tx)
    }

    #[test]
    fn test_config_builder() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(50))
            .with_max_interval(Duration::from_secs(10))
            .with_backoff_multiplier(0.5);

        assert_eq!(config.min_interval, Duration::from_millis(50));
        assert_eq!(config.max_interval, Duration::from_secs(10));
        assert_eq!(config.backoff_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_backoff_grows_to_ceiling_and_resets() {
        let store = Arc::new(InMemoryTaskStore::new());
        let (mut poller, _tx) = poller(Arc::clone(&store));

        assert!(poller.poll().await.unwrap().is_none());
        assert!(!poller.wait().await);
        assert_eq!(poller.current_interval(), Duration::from_millis(20));
        assert!(!poller.wait().await);
        assert!(!poller.wait().await);
        assert_eq!(poller.current_interval(), Duration::from_millis(40));

        store.create(NewTask::new("o1", json!({}))).await.unwrap();
        assert!(poller.poll().await.unwrap().is_some());
        assert_eq!(poller.current_interval(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let store = Arc::new(InMemoryTaskStore::new());
        store.create(NewTask::new("o1", json!({}))).await.unwrap();
        let (mut poller, tx) = poller(Arc::clone(&store));

        tx.send(true).unwrap();
        assert!(poller.is_shutdown());
        assert!(poller.poll().await.unwrap().is_none());
        assert!(poller.wait().await);
        assert_eq!(store.count_by_status(crate::persistence::TaskStatus::Pending), 1);
    }
}
