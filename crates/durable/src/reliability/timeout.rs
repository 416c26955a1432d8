//! Execution timeout enforcement
//!
//! The handler runs on its own tokio task so that a panic, a timeout or a
//! forced stop all come back to the calling slot as a [`HandlerError`].
//! Once the budget is exceeded the handler task is aborted and the context's
//! cancellation token is cancelled, releasing anything tied to it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::handler::{HandlerContext, HandlerError, HandlerResult, TaskHandler};

/// Message recorded when a slot is reclaimed by a stopping worker
pub const WORKER_STOPPED: &str = "worker stopped";

/// Run `handler` on `input`, failing with [`HandlerError::Timeout`] after `timeout`
pub async fn execute_with_timeout(
    handler: Arc<dyn TaskHandler>,
    ctx: HandlerContext,
    input: serde_json::Value,
    timeout: Duration,
) -> HandlerResult {
    let token = ctx.cancellation_token().clone();
    let task_id = ctx.task_id;

    let mut execution = tokio::spawn(async move { handler.handle(&ctx, input).await });

    tokio::select! {
        joined = tokio::time::timeout(timeout, &mut execution) => match joined {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                warn!(%task_id, "Task handler aborted: {}", join_error);
                if join_error.is_panic() {
                    Err(HandlerError::failed("task handler panicked"))
                } else {
                    Err(HandlerError::Cancelled(WORKER_STOPPED.to_string()))
                }
            }
            Err(_) => {
                warn!(%task_id, ?timeout, "Task handler timed out");
                execution.abort();
                token.cancel();
                Err(HandlerError::Timeout(timeout))
            }
        },
        _ = token.cancelled() => {
            debug!(%task_id, "Task execution cancelled");
            execution.abort();
            Err(HandlerError::Cancelled(WORKER_STOPPED.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use chrono::Utc;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx(token: CancellationToken) -> HandlerContext {
        HandlerContext::new(Uuid::now_v7(), "o1", Utc::now(), token)
    }

    #[tokio::test]
    async fn test_result_passes_through() {
        let handler = Arc::new(handler_fn("echo", |_, input| async move { Ok(input) }));
        let result = execute_with_timeout(
            handler,
            ctx(CancellationToken::new()),
            json!({"k": "v"}),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result, Ok(json!({"k": "v"})));

        let failing = Arc::new(handler_fn("fail", |_, _| async move {
            Err(HandlerError::failed("boom"))
        }));
        let result = execute_with_timeout(
            failing,
            ctx(CancellationToken::new()),
            json!({}),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result, Err(HandlerError::failed("boom")));
    }

    #[tokio::test]
    async fn test_timeout_cancels_token() {
        let token = CancellationToken::new();
        let handler = Arc::new(handler_fn("slow", |_, _| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }));

        let result = execute_with_timeout(
            handler,
            ctx(token.clone()),
            json!({}),
            Duration::from_millis(20),
        )
        .await;

        assert_eq!(result, Err(HandlerError::Timeout(Duration::from_millis(20))));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let token = CancellationToken::new();
        let handler = Arc::new(handler_fn("slow", |_, _| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result =
            execute_with_timeout(handler, ctx(token), json!({}), Duration::from_secs(30)).await;
        assert_eq!(
            result,
            Err(HandlerError::Cancelled(WORKER_STOPPED.to_string()))
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let handler = Arc::new(handler_fn("panics", |_, input| async move {
            if input.is_object() {
                panic!("handler bug");
            }
            Ok(input)
        }));

        let result = execute_with_timeout(
            handler,
            ctx(CancellationToken::new()),
            json!({}),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result, Err(HandlerError::failed("task handler panicked")));
    }
}
