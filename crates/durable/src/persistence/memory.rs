//! In-memory implementation of TaskStore

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use super::store::*;
use super::task::{Task, TaskStatus};

/// In-memory implementation of TaskStore
///
/// Every mutation takes the write lock for its whole read-check-write
/// sequence, so `claim_next` hands each pending task to exactly one caller.
/// Provides the same semantics as the PostgreSQL implementation within a
/// single process.
///
/// # Example
///
/// ```
/// use noscope_durable::InMemoryTaskStore;
///
/// let store = InMemoryTaskStore::new();
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored tasks
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Count tasks in the given status
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    /// Insert a task as-is (for seeding tests with fixed timestamps)
    pub fn insert(&self, task: Task) {
        self.tasks.write().insert(task.id, task);
    }

    fn transition<F>(&self, id: Uuid, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), StoreError>,
    {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Err(e) = apply(task) {
            error!(task_id = %id, "Rejected task transition: {}", e);
            return Err(e);
        }
        Ok(task.clone())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        new_task.validate()?;
        let task = Task::new(new_task.object_id, new_task.input, Utc::now());
        self.tasks.write().insert(task.id, task.clone());
        debug!(task_id = %task.id, object_id = %task.object_id, "created task");
        Ok(task)
    }

    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(
        &self,
        filter: &TaskFilter,
        pagination: Pagination,
    ) -> Result<TaskPage, StoreError> {
        let tasks = self.tasks.read();
        let mut matching: Vec<&Task> = tasks.values().filter(|t| filter.matches(t)).collect();
        matching.sort_by(|a, b| list_order(a, b));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(TaskPage { tasks: page, total })
    }

    async fn claim_next(&self) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write();
        let next_id = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by(|a, b| claim_order(a, b))
            .map(|t| t.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        // Present: selected under the same write guard
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.mark_processing(Utc::now())?;
        debug!(task_id = %id, "claimed task");
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<Task, StoreError> {
        self.transition(id, |task| task.mark_completed(output, Utc::now()))
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<Task, StoreError> {
        self.transition(id, |task| task.mark_failed(error, Utc::now()))
    }
}
