//! Persistence layer for tasks
//!
//! This module provides:
//! - [`Task`] and the [`TaskStatus`] state machine
//! - [`TaskStore`] trait for task persistence and claiming
//! - [`InMemoryTaskStore`] for tests and single-process deployments
//! - [`PostgresTaskStore`] for production

mod memory;
mod postgres;
mod store;
mod task;

pub use memory::InMemoryTaskStore;
pub use postgres::PostgresTaskStore;
pub use store::{
    claim_order, list_order, NewTask, Pagination, StoreError, TaskFilter, TaskPage, TaskStore,
};
pub use task::{Task, TaskStatus};
