//! Consecutive-failure escalation
//!
//! Per-task failures are recorded on the task and counted; they never stop
//! the pool on their own. Only an unbroken run of failures reaching the
//! configured threshold promotes them to a pool-level stop.

use serde::{Deserialize, Serialize};

/// When to stop the pool after repeated task failures
///
/// # Example
///
/// ```
/// use noscope_durable::reliability::EscalationPolicy;
///
/// let policy = EscalationPolicy::disabled().with_max_consecutive_failures(5);
/// assert_eq!(policy.max_consecutive_failures, Some(5));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Stop after this many failures in a row (None = never)
    pub max_consecutive_failures: Option<u32>,
}

impl EscalationPolicy {
    /// Never escalate
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Escalate once `max` failures happen in a row
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = Some(max.max(1));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.max_consecutive_failures.is_some()
    }
}

/// Running count of consecutive task failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Record a failure; returns true exactly when the threshold is reached
    pub fn record_failure(&mut self, policy: &EscalationPolicy) -> bool {
        self.count = self.count.saturating_add(1);
        policy
            .max_consecutive_failures
            .is_some_and(|max| self.count == max)
    }
}
