//! Task record and its lifecycle state machine
//!
//! ```text
//! ┌─────────┐  claim   ┌────────────┐  complete  ┌───────────┐
//! │ Pending │ ───────► │ Processing │ ─────────► │ Completed │
//! └─────────┘          └────────────┘            └───────────┘
//!                            │         fail      ┌───────────┐
//!                            └─────────────────► │  Failed   │
//!                                                └───────────┘
//! ```
//!
//! Transitions only move forward and never skip `processing`. A transition
//! request from any other state is rejected with
//! [`StoreError::InvalidTransition`], including repeated completion of a
//! task that is already terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::store::StoreError;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting to be claimed
    Pending,
    /// Claimed by a worker and executing
    Processing,
    /// Handler returned an output
    Completed,
    /// Handler failed, timed out, or the worker stopped
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Validation(format!("unknown task status: {other}"))),
        }
    }
}

/// A unit of work bound to an external object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Unique task ID (UUID v7, time-ordered).
    pub id: Uuid,
    /// Opaque reference to an object in the external object registry.
    #[schema(example = "0193a6a2-7c1e-7d2b-9a55-3f0e1b2c4d5e")]
    pub object_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Structured input payload. Always a JSON object.
    #[schema(value_type = Object)]
    pub input: serde_json::Value,
    /// Handler output, present only once the task is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub output: Option<serde_json::Value>,
    /// Failure message, present only once the task has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when a worker claims the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the task reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a new pending task
    pub fn new(object_id: impl Into<String>, input: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            object_id: object_id.into(),
            status: TaskStatus::Pending,
            input,
            output: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// `pending -> processing`
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.guard(TaskStatus::Processing)?;
        self.status = TaskStatus::Processing;
        self.started_at = Some(now);
        Ok(())
    }

    /// `processing -> completed`
    pub fn mark_completed(
        &mut self,
        output: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.guard(TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(now.max(self.started_at.unwrap_or(now)));
        Ok(())
    }

    /// `processing -> failed`
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.guard(TaskStatus::Failed)?;
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now.max(self.started_at.unwrap_or(now)));
        Ok(())
    }

    fn guard(&self, next: TaskStatus) -> Result<(), StoreError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> Task {
        Task::new("o1", json!({"k": "v"}), Utc::now())
    }

    #[test]
    fn test_status_edges() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));

        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Processing));
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!(matches!(
            "done".parse::<TaskStatus>(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_happy_path_sets_timestamps_once() {
        let mut task = pending();
        assert!(task.started_at.is_none());

        task.mark_processing(Utc::now()).unwrap();
        let started = task.started_at.unwrap();

        task.mark_completed(json!({"ok": true}), Utc::now()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.started_at, Some(started));
        assert!(task.completed_at.unwrap() >= started);
        assert_eq!(task.output, Some(json!({"ok": true})));
        assert!(task.error.is_none());
    }

    #[test]
    fn test_completed_at_never_precedes_started_at() {
        let mut task = pending();
        let now = Utc::now();
        task.mark_processing(now).unwrap();
        task.mark_failed("boom", now - chrono::Duration::seconds(5))
            .unwrap();
        assert_eq!(task.completed_at, Some(now));
    }

    #[test]
    fn test_skip_processing_rejected() {
        let mut task = pending();
        let err = task.mark_completed(json!({}), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Completed,
                ..
            }
        ));
        assert!(task.output.is_none());
    }

    #[test]
    fn test_double_completion_rejected() {
        let mut task = pending();
        task.mark_processing(Utc::now()).unwrap();
        task.mark_failed("boom", Utc::now()).unwrap();

        let err = task.mark_completed(json!({}), Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(task.output.is_none());
        assert_eq!(task.error.as_deref(), Some("boom"));

        assert!(task.mark_failed("again", Utc::now()).is_err());
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serialization_omits_unset_fields() {
        let task = pending();
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value.get("output").is_none());
        assert!(value.get("started_at").is_none());
    }
}
