//! Task creation and queries

use std::sync::Arc;

use tracing::{error, instrument};
use uuid::Uuid;

use super::pagination::PageRequest;
use crate::persistence::{NewTask, StoreError, Task, TaskFilter, TaskStatus, TaskStore};

/// Longest accepted object reference, in bytes
pub const MAX_OBJECT_ID_LEN: usize = 255;

/// Largest accepted serialized input, in bytes
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

/// Errors surfaced to API callers
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("task not found: {0}")]
    NotFound(Uuid),

    /// Store integrity violation; indicates a logic bug
    #[error("{0}")]
    InvalidTransition(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::NotFound(id) => Self::NotFound(id),
            err @ StoreError::InvalidTransition { .. } => {
                error!("Task store integrity violation: {}", err);
                Self::InvalidTransition(err.to_string())
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Store(msg),
        }
    }
}

/// Listing query as received from a caller
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub object_id: Option<String>,
    /// Status name; unknown names are rejected
    pub status: Option<String>,
    pub page: PageRequest,
}

/// One page of tasks plus the effective pagination
#[derive(Debug, Clone)]
pub struct TaskListing {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Public-facing task operations
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Validate and persist a new pending task
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        object_id: String,
        input: serde_json::Value,
    ) -> Result<Task, ServiceError> {
        let object_id = object_id.trim().to_string();
        if object_id.len() > MAX_OBJECT_ID_LEN {
            return Err(ServiceError::Validation(format!(
                "object_id exceeds {MAX_OBJECT_ID_LEN} bytes"
            )));
        }

        let new_task = NewTask::new(object_id, input);
        new_task.validate()?;

        let size = serde_json::to_vec(&new_task.input)
            .map_err(|e| ServiceError::Validation(format!("input is not serializable: {e}")))?
            .len();
        if size > MAX_INPUT_BYTES {
            return Err(ServiceError::Validation(format!(
                "input exceeds {MAX_INPUT_BYTES} bytes"
            )));
        }

        Ok(self.store.create(new_task).await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Task, ServiceError> {
        Ok(self.store.get(id).await?)
    }

    /// Filtered, paginated listing; empty filter values count as absent
    #[instrument(skip(self))]
    pub async fn list(&self, query: TaskQuery) -> Result<TaskListing, ServiceError> {
        let status = match non_empty(query.status) {
            Some(status) => Some(status.parse::<TaskStatus>()?),
            None => None,
        };
        let filter = TaskFilter {
            object_id: non_empty(query.object_id),
            status,
        };
        let pagination = query.page.clamp();

        let page = self.store.list(&filter, pagination).await?;
        Ok(TaskListing {
            tasks: page.tasks,
            total: page.total,
            limit: pagination.limit,
            offset: pagination.offset,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryTaskStore;
    use serde_json::json;

    fn service() -> (TaskService, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        (TaskService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (service, store) = service();

        let task = service
            .create(" o1 ".into(), json!({"k": "v"}))
            .await
            .unwrap();
        assert_eq!(task.object_id, "o1");
        assert_eq!(task.status, TaskStatus::Pending);

        for (object_id, input) in [
            ("".to_string(), json!({})),
            ("o1".to_string(), json!([1, 2, 3])),
            ("x".repeat(MAX_OBJECT_ID_LEN + 1), json!({})),
            ("o1".to_string(), json!({"blob": "x".repeat(MAX_INPUT_BYTES)})),
        ] {
            assert!(matches!(
                service.create(object_id, input).await,
                Err(ServiceError::Validation(_))
            ));
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_maps_not_found() {
        let (service, _) = service();
        let id = Uuid::now_v7();
        assert!(matches!(service.get(id).await, Err(ServiceError::NotFound(x)) if x == id));
    }

    #[tokio::test]
    async fn test_list_clamps_and_filters() {
        let (service, store) = service();
        for i in 0..12 {
            service
                .create(format!("o{}", i % 2), json!({"i": i}))
                .await
                .unwrap();
        }
        store.claim_next().await.unwrap();

        let listing = service
            .list(TaskQuery {
                page: PageRequest::new(Some(500), Some(-1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.limit, 100);
        assert_eq!(listing.offset, 0);
        assert_eq!(listing.total, 12);
        assert_eq!(listing.tasks.len(), 12);

        let listing = service
            .list(TaskQuery {
                object_id: Some("o1".into()),
                status: Some("".into()),
                page: PageRequest::default(),
            })
            .await
            .unwrap();
        assert_eq!(listing.total, 6);
        assert_eq!(listing.limit, 10);

        let listing = service
            .list(TaskQuery {
                status: Some("processing".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let (service, _) = service();
        let result = service
            .list(TaskQuery {
                status: Some("done".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_invalid_transition_maps_through() {
        let err = ServiceError::from(StoreError::InvalidTransition {
            task_id: Uuid::now_v7(),
            from: TaskStatus::Completed,
            to: TaskStatus::Failed,
        });
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }
}
