//! # Noscope Durable
//!
//! Task queue and worker lifecycle core: a durable task store, a bounded
//! worker pool that claims and executes tasks, and a controller that starts,
//! drains and stops the pool while keeping consistent metrics.
//!
//! ## Features
//!
//! - **Forward-only task state machine**: `pending -> processing -> completed | failed`
//! - **Exclusive claims**: in-memory write lock or PostgreSQL `FOR UPDATE SKIP LOCKED`
//! - **Bounded execution**: semaphore-limited slots, per-task timeouts with cancellation
//! - **Graceful stop**: drain with a deadline, then force-fail what is left
//! - **Escalation**: a run of consecutive failures stops the pool
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           TaskService              WorkerController          │
//! │  (create / get / list, paging)  (start / stop / metrics)     │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             ▼
//!                 │               ┌───────────────────────────┐
//!                 │               │        WorkerPool          │
//!                 │               │ (claims, slots, handlers)  │
//!                 │               └─────────────┬─────────────┘
//!                 ▼                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TaskStore                            │
//! │       (InMemoryTaskStore, PostgresTaskStore: tasks table)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use noscope_durable::prelude::*;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl TaskHandler for EchoHandler {
//!     async fn handle(&self, _ctx: &HandlerContext, input: Value) -> HandlerResult {
//!         Ok(input)
//!     }
//! }
//!
//! let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//! let registry = HandlerRegistry::new().with_default(EchoHandler);
//! let controller = WorkerController::new(store.clone(), registry, WorkerPoolConfig::default());
//! let service = TaskService::new(store);
//!
//! service.create("object-1".into(), json!({"k": "v"})).await?;
//! controller.start().await?;
//! ```

pub mod handler;
pub mod persistence;
pub mod reliability;
pub mod service;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::handler::{
        handler_fn, HandlerContext, HandlerError, HandlerRegistry, HandlerResult, TaskHandler,
    };
    pub use crate::persistence::{
        InMemoryTaskStore, NewTask, PostgresTaskStore, StoreError, Task, TaskStatus, TaskStore,
    };
    pub use crate::service::{PageRequest, ServiceError, TaskQuery, TaskService};
    pub use crate::worker::{
        ControllerError, WorkerController, WorkerMetrics, WorkerPoolConfig, WorkerStatus,
    };
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use handler::{HandlerContext, HandlerError, HandlerRegistry, HandlerResult, TaskHandler};
pub use persistence::{
    InMemoryTaskStore, NewTask, PostgresTaskStore, StoreError, Task, TaskFilter, TaskStatus,
    TaskStore,
};
pub use reliability::EscalationPolicy;
pub use service::{PageRequest, ServiceError, TaskListing, TaskQuery, TaskService};
pub use worker::{
    ControllerError, PollerConfig, WorkerController, WorkerMetrics, WorkerPoolConfig, WorkerStatus,
};
