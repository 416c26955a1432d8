//! Worker status and metrics bookkeeping
//!
//! Status, slot count and counters sit behind one lock so a snapshot never
//! sees a task counted as succeeded without also being counted as processed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::controller::ControllerError;
use crate::reliability::{EscalationPolicy, FailureStreak};

/// Worker pool lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkerMetrics {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub worker_status: WorkerStatus,
    /// Tasks currently holding a slot
    pub current_tasks: usize,
    pub max_concurrency: usize,
    /// Length of the current run of failed tasks
    pub consecutive_failures: u32,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct MetricsState {
    status: WorkerStatus,
    current_tasks: usize,
    tasks_processed: u64,
    tasks_succeeded: u64,
    tasks_failed: u64,
    streak: FailureStreak,
    last_start_time: Option<DateTime<Utc>>,
    last_error_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared recorder for status transitions and per-task outcomes
///
/// Counters live as long as the recorder; stopping and restarting the pool
/// keeps them.
#[derive(Debug)]
pub struct MetricsRecorder {
    max_concurrency: usize,
    state: Mutex<MetricsState>,
}

impl MetricsRecorder {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            state: Mutex::new(MetricsState {
                status: WorkerStatus::Stopped,
                current_tasks: 0,
                tasks_processed: 0,
                tasks_succeeded: 0,
                tasks_failed: 0,
                streak: FailureStreak::default(),
                last_start_time: None,
                last_error_time: None,
                last_error: None,
            }),
        }
    }

    pub fn snapshot(&self) -> WorkerMetrics {
        let state = self.state.lock();
        WorkerMetrics {
            tasks_processed: state.tasks_processed,
            tasks_succeeded: state.tasks_succeeded,
            tasks_failed: state.tasks_failed,
            worker_status: state.status,
            current_tasks: state.current_tasks,
            max_concurrency: self.max_concurrency,
            consecutive_failures: state.streak.count(),
            last_start_time: state.last_start_time,
            last_error_time: state.last_error_time,
            last_error: state.last_error.clone(),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().status
    }

    pub fn current_tasks(&self) -> usize {
        self.state.lock().current_tasks
    }

    /// `stopped -> starting`
    pub(crate) fn begin_start(&self) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        match state.status {
            WorkerStatus::Stopped => {
                state.status = WorkerStatus::Starting;
                state.streak.record_success();
                Ok(())
            }
            WorkerStatus::Starting | WorkerStatus::Running => Err(ControllerError::AlreadyRunning),
            WorkerStatus::Stopping => Err(ControllerError::Stopping),
        }
    }

    /// `starting -> running`
    pub(crate) fn mark_running(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.status = WorkerStatus::Running;
        state.last_start_time = Some(now);
    }

    /// `running -> stopping`
    pub(crate) fn begin_stop(&self) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        match state.status {
            WorkerStatus::Running => {
                state.status = WorkerStatus::Stopping;
                Ok(())
            }
            WorkerStatus::Stopped | WorkerStatus::Stopping => Err(ControllerError::AlreadyStopped),
            WorkerStatus::Starting => Err(ControllerError::Starting),
        }
    }

    /// Back to `stopped`, from `stopping` or an aborted start
    pub(crate) fn mark_stopped(&self) {
        self.state.lock().status = WorkerStatus::Stopped;
    }

    /// A claimed task took a slot
    pub(crate) fn task_claimed(&self) {
        self.state.lock().current_tasks += 1;
    }

    /// A task reached a terminal status and released its slot
    ///
    /// Returns the failure streak when it just reached the escalation
    /// threshold while the pool is running. The pool moves to `stopping` in
    /// the same critical section, so no further task is claimed.
    pub(crate) fn task_finished(
        &self,
        error: Option<&str>,
        policy: &EscalationPolicy,
        now: DateTime<Utc>,
    ) -> Option<u32> {
        let mut state = self.state.lock();
        state.current_tasks = state.current_tasks.saturating_sub(1);
        state.tasks_processed += 1;

        match error {
            None => {
                state.tasks_succeeded += 1;
                state.streak.record_success();
                None
            }
            Some(message) => {
                state.tasks_failed += 1;
                state.last_error = Some(message.to_string());
                state.last_error_time = Some(now);
                let reached = state.streak.record_failure(policy);
                if reached && state.status == WorkerStatus::Running {
                    state.status = WorkerStatus::Stopping;
                    Some(state.streak.count())
                } else {
                    None
                }
            }
        }
    }

    /// Surface a pool-level error without counting a task
    pub(crate) fn record_error(&self, message: impl Into<String>, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.last_error = Some(message.into());
        state.last_error_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let recorder = MetricsRecorder::new(2);
        assert_eq!(recorder.status(), WorkerStatus::Stopped);
        assert!(matches!(
            recorder.begin_stop(),
            Err(ControllerError::AlreadyStopped)
        ));

        recorder.begin_start().unwrap();
        assert!(matches!(
            recorder.begin_start(),
            Err(ControllerError::AlreadyRunning)
        ));
        assert!(matches!(recorder.begin_stop(), Err(ControllerError::Starting)));

        let now = Utc::now();
        recorder.mark_running(now);
        assert_eq!(recorder.snapshot().last_start_time, Some(now));

        recorder.begin_stop().unwrap();
        assert!(matches!(
            recorder.begin_stop(),
            Err(ControllerError::AlreadyStopped)
        ));
        assert!(matches!(recorder.begin_start(), Err(ControllerError::Stopping)));

        recorder.mark_stopped();
        assert_eq!(recorder.status(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_outcomes_update_counters_together() {
        let recorder = MetricsRecorder::new(2);
        let policy = EscalationPolicy::disabled();

        recorder.task_claimed();
        recorder.task_claimed();
        assert_eq!(recorder.current_tasks(), 2);

        recorder.task_finished(None, &policy, Utc::now());
        recorder.task_finished(Some("boom"), &policy, Utc::now());

        let metrics = recorder.snapshot();
        assert_eq!(metrics.current_tasks, 0);
        assert_eq!(metrics.tasks_processed, 2);
        assert_eq!(metrics.tasks_succeeded, 1);
        assert_eq!(metrics.tasks_failed, 1);
        assert_eq!(metrics.consecutive_failures, 1);
        assert_eq!(metrics.last_error.as_deref(), Some("boom"));
        assert!(metrics.last_error_time.is_some());
    }

    #[test]
    fn test_escalation_only_while_running() {
        let recorder = MetricsRecorder::new(1);
        let policy = EscalationPolicy::disabled().with_max_consecutive_failures(2);

        recorder.task_finished(Some("a"), &policy, Utc::now());
        assert_eq!(recorder.task_finished(Some("b"), &policy, Utc::now()), None);

        recorder.begin_start().unwrap();
        recorder.mark_running(Utc::now());
        assert_eq!(recorder.snapshot().consecutive_failures, 0);

        assert_eq!(recorder.task_finished(Some("c"), &policy, Utc::now()), None);
        assert_eq!(recorder.task_finished(Some("d"), &policy, Utc::now()), Some(2));
        assert_eq!(recorder.status(), WorkerStatus::Stopping);
    }

    #[test]
    fn test_snapshot_serializes_nulls() {
        let value = serde_json::to_value(MetricsRecorder::new(3).snapshot()).unwrap();
        assert_eq!(value["worker_status"], "stopped");
        assert_eq!(value["max_concurrency"], 3);
        assert!(value["last_error"].is_null());
        assert!(value["last_start_time"].is_null());
    }
}
