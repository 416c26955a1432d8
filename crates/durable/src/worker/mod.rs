//! Worker pool and lifecycle controller
//!
//! This module provides:
//! - [`WorkerController`] - Start/stop control and metrics snapshots
//! - [`WorkerPoolConfig`] - Concurrency, timeouts and escalation settings
//! - [`TaskPoller`] - Task claiming with exponential idle backoff
//! - [`WorkerMetrics`] - Point-in-time pool status and counters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkerController                         │
//! │  (status transitions, drain on stop, escalation supervisor)  │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ start spawns
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │  ┌─────────────┐   claim_next   ┌─────────────────────┐     │
//! │  │ TaskPoller  │ ─────────────► │     TaskStore       │     │
//! │  │  (backoff)  │                └─────────────────────┘     │
//! │  └──────┬──────┘                                            │
//! │         ▼                                                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   Task slots (Semaphore-limited, per-task timeout)   │    │
//! │  │  [Task 1] [Task 2] [Task 3] ... [Task N]            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  MetricsRecorder (status + counters under one lock)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod controller;
mod metrics;
mod poller;
mod pool;

pub use config::WorkerPoolConfig;
pub use controller::{ControllerError, WorkerController};
pub use metrics::{MetricsRecorder, WorkerMetrics, WorkerStatus};
pub use poller::{PollerConfig, TaskPoller};
