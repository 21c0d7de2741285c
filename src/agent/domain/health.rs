//! Health state machine driven by consecutive probe and dispatch failures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability of an agent as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Responding normally.
    Online,
    /// Recent failures; still routable but ranked below online agents.
    Degraded,
    /// Excluded from selection until a probe succeeds.
    Offline,
}

impl HealthState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }

    /// Returns whether agents in this state may receive tasks.
    #[must_use]
    pub const fn is_routable(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of [`HealthState`] caused by a recorded signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    /// State before the signal.
    pub from: HealthState,
    /// State after the signal.
    pub to: HealthState,
}

/// Consecutive-failure thresholds for the health state machine.
///
/// `online` becomes `degraded` after `degrade_after` consecutive failures and
/// `offline` after a further `offline_after` failures. Any success resets the
/// counter and returns the agent to `online`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    degrade_after: u32,
    offline_after: u32,
}

impl HealthPolicy {
    /// Creates a policy; zero thresholds are raised to one.
    #[must_use]
    pub fn new(degrade_after: u32, offline_after: u32) -> Self {
        Self {
            degrade_after: degrade_after.max(1),
            offline_after: offline_after.max(1),
        }
    }

    /// Returns the failure count that degrades an online agent.
    #[must_use]
    pub const fn degrade_after(self) -> u32 {
        self.degrade_after
    }

    /// Returns the further failure count that takes a degraded agent offline.
    #[must_use]
    pub const fn offline_after(self) -> u32 {
        self.offline_after
    }

    /// Returns the state implied by a run of consecutive failures.
    #[must_use]
    pub const fn state_for_failures(self, consecutive_failures: u32) -> HealthState {
        if consecutive_failures >= self.degrade_after.saturating_add(self.offline_after) {
            HealthState::Offline
        } else if consecutive_failures >= self.degrade_after {
            HealthState::Degraded
        } else {
            HealthState::Online
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::new(3, 3)
    }
}
