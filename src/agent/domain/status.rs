//! Externally visible agent status.

use super::ParseAgentStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status reported for an agent.
///
/// `Busy` is derived from load (every slot taken); the other variants mirror
/// the agent's [`HealthState`](super::HealthState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not reachable; excluded from selection.
    Offline,
    /// Reachable with spare capacity.
    Online,
    /// Every concurrency slot is in use.
    Busy,
    /// Reachable after recent failures; deprioritized.
    Degraded,
}

impl AgentStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Busy => "busy",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentStatus {
    type Error = ParseAgentStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            "busy" => Ok(Self::Busy),
            "degraded" => Ok(Self::Degraded),
            _ => Err(ParseAgentStatusError(value.to_owned())),
        }
    }
}
