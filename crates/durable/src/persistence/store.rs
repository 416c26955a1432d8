//! TaskStore trait definition

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskStatus};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed create input
    #[error("validation error: {0}")]
    Validation(String),

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(Uuid),

    /// State machine violation
    #[error("invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Input for [`TaskStore::create`]
#[derive(Debug, Clone)]
pub struct NewTask {
    pub object_id: String,
    pub input: serde_json::Value,
}

impl NewTask {
    pub fn new(object_id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            object_id: object_id.into(),
            input,
        }
    }

    /// Checks shared by every store implementation
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.object_id.trim().is_empty() {
            return Err(StoreError::Validation("object_id must not be empty".into()));
        }
        if !self.input.is_object() {
            return Err(StoreError::Validation("input must be a JSON object".into()));
        }
        Ok(())
    }
}

/// Filter for listing tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub object_id: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(ref object_id) = self.object_id {
            if &task.object_id != object_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        true
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// One page of a filtered task listing
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    /// Size of the filtered set, not of the page
    pub total: u64,
}

/// Listing order: newest first, ties broken by ascending id
pub fn list_order(a: &Task, b: &Task) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Claim order: oldest first, ties broken by ascending id
pub fn claim_order(a: &Task, b: &Task) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Durable record of tasks and their lifecycle state
///
/// Implementations must be thread-safe. `claim_next` is the only
/// mutual-exclusion point of the system: concurrent callers, including
/// pools in other processes sharing the same backing store, must never
/// receive the same task.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Persist a new task in `pending` status
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> Result<Task, StoreError>;

    /// List a page of tasks matching `filter`, ordered by [`list_order`]
    async fn list(&self, filter: &TaskFilter, pagination: Pagination)
        -> Result<TaskPage, StoreError>;

    /// Atomically move the oldest pending task to `processing`
    async fn claim_next(&self) -> Result<Option<Task>, StoreError>;

    /// `processing -> completed`
    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<Task, StoreError>;

    /// `processing -> failed`
    async fn fail(&self, id: Uuid, error: &str) -> Result<Task, StoreError>;
}
