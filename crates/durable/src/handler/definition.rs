//! TaskHandler trait definition

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::HandlerContext;

/// Error type for handler failures
///
/// Every variant ends up recorded on the task as its `error` message; none
/// of them is surfaced as a service error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Handler returned an error
    #[error("{0}")]
    Failed(String),

    /// Handler exceeded the execution timeout
    #[error("task execution timed out after {0:?}")]
    Timeout(Duration),

    /// Execution was abandoned before the handler finished
    #[error("task execution cancelled: {0}")]
    Cancelled(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Handler execution result
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Executes the work a task describes
///
/// # Example
///
/// ```ignore
/// use noscope_durable::prelude::*;
///
/// struct EchoHandler;
///
/// #[async_trait]
/// impl TaskHandler for EchoHandler {
///     async fn handle(&self, _ctx: &HandlerContext, input: Value) -> HandlerResult {
///         Ok(json!({ "echo": input }))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Execute a task with its input payload
    async fn handle(&self, ctx: &HandlerContext, input: serde_json::Value) -> HandlerResult;
}

/// Adapter turning an async closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    name: String,
    func: F,
}

/// Wrap an async closure as a handler
///
/// ```ignore
/// let handler = handler_fn("echo", |_ctx, input| async move { Ok(input) });
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> FnHandler<F>
where
    F: Fn(HandlerContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler {
        name: name.into(),
        func,
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(HandlerContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &HandlerContext, input: serde_json::Value) -> HandlerResult {
        (self.func)(ctx.clone(), input).await
    }
}
