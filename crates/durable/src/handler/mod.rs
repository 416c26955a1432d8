//! Task handler capability
//!
//! The worker pool does not know how to execute a task. It resolves a
//! [`TaskHandler`] from the [`HandlerRegistry`] and invokes it with the
//! task input and a [`HandlerContext`] carrying a cancellation token.

mod context;
mod definition;
mod registry;

pub use context::HandlerContext;
pub use definition::{handler_fn, FnHandler, HandlerError, HandlerResult, TaskHandler};
pub use registry::{HandlerRegistry, KIND_FIELD};
