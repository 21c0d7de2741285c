//! Failure classification attached to tasks.

use super::ParseFailureKindError;
use crate::agent::domain::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an execution failure recorded against a task.
///
/// Transient conditions (saturation, no agent, pool exhaustion) never reach a
/// task record; they only delay dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No connection to the endpoint or host.
    Unreachable,
    /// Session setup, command, or request exceeded its bound.
    Timeout,
    /// The remote side ran and signalled failure.
    RemoteError,
}

impl FailureKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::RemoteError => "remote_error",
        }
    }

    /// Returns whether one automatic retry on another agent is allowed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FailureKind {
    type Error = ParseFailureKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "unreachable" => Ok(Self::Unreachable),
            "timeout" => Ok(Self::Timeout),
            "remote_error" => Ok(Self::RemoteError),
            _ => Err(ParseFailureKindError(value.to_owned())),
        }
    }
}

/// A classified failure with its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable detail from the executor.
    pub detail: String,
    /// Agent the failed attempt ran on.
    pub agent_id: AgentId,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}
