//! Reliability patterns for task execution
//!
//! This module provides:
//! - [`execute_with_timeout`] - Handler invocation bounded by a timeout and a cancellation token
//! - [`EscalationPolicy`] - Consecutive-failure threshold that stops the pool

mod escalation;
mod timeout;

pub use escalation::{EscalationPolicy, FailureStreak};
pub use timeout::{execute_with_timeout, WORKER_STOPPED};
