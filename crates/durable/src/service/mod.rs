//! Task Service query facade
//!
//! Thin composition over the [`TaskStore`](crate::persistence::TaskStore)
//! that adds request-level validation and pagination bounds.

mod pagination;
mod tasks;

pub use pagination::{PageRequest, DEFAULT_LIMIT, MAX_LIMIT};
pub use tasks::{ServiceError, TaskListing, TaskQuery, TaskService, MAX_INPUT_BYTES, MAX_OBJECT_ID_LEN};
