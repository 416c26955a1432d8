//! Handler execution context

use chrono::{DateTime, Utc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::persistence::Task;

/// Context provided to handlers during execution
///
/// The token is cancelled when the execution timeout elapses or the worker
/// is force-stopped. Handlers holding external resources should race their
/// work against [`HandlerContext::cancelled`] so those resources are
/// released as soon as the pool gives up on the task.
///
/// # Example
///
/// ```ignore
/// async fn handle(&self, ctx: &HandlerContext, input: Value) -> HandlerResult {
///     tokio::select! {
///         result = call_remote(input) => result,
///         _ = ctx.cancelled() => Err(HandlerError::Cancelled("worker gave up".into())),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub task_id: Uuid,
    pub object_id: String,
    /// When the task was claimed
    pub started_at: DateTime<Utc>,
    cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn new(
        task_id: Uuid,
        object_id: impl Into<String>,
        started_at: DateTime<Utc>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            object_id: object_id.into(),
            started_at,
            cancellation,
        }
    }

    /// Build the context for a claimed task
    pub fn for_task(task: &Task, cancellation: CancellationToken) -> Self {
        Self::new(
            task.id,
            task.object_id.clone(),
            task.started_at.unwrap_or_else(Utc::now),
            cancellation,
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the pool abandons this execution
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
