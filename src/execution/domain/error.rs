//! Classified execution failures.

use crate::task::domain::FailureKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Bounded step that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    /// Establishing a new remote shell session.
    SessionSetup,
    /// Running the remote tool invocation.
    Command,
    /// Waiting for an HTTP response.
    Request,
    /// Waiting for a health probe.
    Probe,
}

impl TimeoutPhase {
    /// Returns a short label for logs and failure details.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionSetup => "session setup",
            Self::Command => "command",
            Self::Request => "request",
            Self::Probe => "probe",
        }
    }
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// No connection to the endpoint or host.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// A bounded step exceeded its limit.
    #[error("{phase} timed out after {}s", after.as_secs())]
    Timeout {
        /// Step that ran out of time.
        phase: TimeoutPhase,
        /// Bound that was exceeded.
        after: Duration,
    },

    /// The remote endpoint or tool ran and reported failure.
    #[error("remote error: {0}")]
    RemoteError(String),

    /// The per-host session cap is reached.
    #[error("session pool for {host} is exhausted ({cap} sessions)")]
    PoolExhausted {
        /// Host whose pool is full.
        host: String,
        /// Session cap in force.
        cap: u32,
    },

    /// The call was aborted by a cancellation request.
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Returns the task failure classification, or `None` for transient
    /// conditions that must not fail a task.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Unreachable(_) => Some(FailureKind::Unreachable),
            Self::Timeout { .. } => Some(FailureKind::Timeout),
            Self::RemoteError(_) => Some(FailureKind::RemoteError),
            Self::PoolExhausted { .. } | Self::Cancelled => None,
        }
    }

    /// Returns whether the failure says something about the agent's health.
    #[must_use]
    pub const fn counts_against_agent(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout { .. })
    }
}
