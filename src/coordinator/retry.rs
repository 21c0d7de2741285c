//! Retry policy applied to classified execution failures.

use crate::execution::domain::ExecutionError;
use crate::task::domain::FailureKind;

/// Default number of automatic retries after a retryable failure.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// What to do with a task whose execution returned an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the task back in the queue without consuming an attempt.
    Requeue,
    /// Put the task back in the queue for another agent.
    RetryElsewhere(FailureKind),
    /// Fail the task with the classification.
    Fail(FailureKind),
    /// Leave the task alone; it was cancelled.
    Ignore,
}

/// Bounded retry on a different agent for unreachable and timed-out
/// executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries per task.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Returns the retry budget.
    #[must_use]
    pub const fn max_retries(self) -> u32 {
        self.max_retries
    }

    /// Decides the fate of a task after `error`.
    ///
    /// `failed_attempts` counts the task's earlier failed attempts, not the
    /// one that just ended. `has_alternate` says whether another routable
    /// agent outside the task's exclusions declares its capability.
    #[must_use]
    pub const fn decide(
        self,
        error: &ExecutionError,
        failed_attempts: u32,
        has_alternate: bool,
    ) -> RetryDecision {
        match error.failure_kind() {
            None => match error {
                ExecutionError::Cancelled => RetryDecision::Ignore,
                _ => RetryDecision::Requeue,
            },
            Some(kind) if kind.is_retryable() && has_alternate && failed_attempts < self.max_retries => {
                RetryDecision::RetryElsewhere(kind)
            }
            Some(kind) => RetryDecision::Fail(kind),
        }
    }
}
