//! Agent selection: ranks eligible agents for a capability.

use super::registry::{AgentRegistry, RegistryError};
use crate::agent::{
    domain::{Agent, AgentId, CapabilityTag, HealthState},
    ports::AgentStore,
};
use mockable::Clock;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by agent selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// No routable agent with spare capacity declares the capability.
    #[error("no agent available for capability {0}")]
    NoAgentAvailable(CapabilityTag),

    /// Registry access failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Picks the best agent for a capability from the registry.
///
/// Ranking: `online` before `degraded`, then lower load ratio, then lower
/// smoothed latency (agents without history last), then identifier.
pub struct AgentSelector<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    registry: Arc<AgentRegistry<S, C>>,
}

impl<S, C> AgentSelector<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    /// Creates a selector reading from `registry`.
    #[must_use]
    pub const fn new(registry: Arc<AgentRegistry<S, C>>) -> Self {
        Self { registry }
    }

    /// Returns every eligible agent, best first.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoAgentAvailable`] when the list would be
    /// empty.
    pub fn candidates(
        &self,
        capability: &CapabilityTag,
        excluded: &[AgentId],
    ) -> Result<Vec<Agent>, SelectionError> {
        let mut eligible: Vec<Agent> = self
            .registry
            .list_by_capability(capability)?
            .into_iter()
            .filter(|agent| agent.has_spare_capacity() && !excluded.contains(agent.id()))
            .collect();
        if eligible.is_empty() {
            return Err(SelectionError::NoAgentAvailable(capability.clone()));
        }
        eligible.sort_by(rank);
        Ok(eligible)
    }

    /// Returns the best eligible agent.
    ///
    /// The returned snapshot holds no reservation; callers must still take a
    /// slot through [`AgentRegistry::reserve_slot`].
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoAgentAvailable`] when nothing is eligible.
    pub fn select(
        &self,
        capability: &CapabilityTag,
        excluded: &[AgentId],
    ) -> Result<Agent, SelectionError> {
        self.candidates(capability, excluded)?
            .into_iter()
            .next()
            .ok_or_else(|| SelectionError::NoAgentAvailable(capability.clone()))
    }
}

/// Total order used to rank eligible agents.
#[must_use]
pub fn rank(lhs: &Agent, rhs: &Agent) -> Ordering {
    health_tier(lhs.health())
        .cmp(&health_tier(rhs.health()))
        .then_with(|| lhs.compare_load(rhs))
        .then_with(|| compare_latency(lhs.latency_estimate_ms(), rhs.latency_estimate_ms()))
        .then_with(|| lhs.id().cmp(rhs.id()))
}

const fn health_tier(state: HealthState) -> u8 {
    match state {
        HealthState::Online => 0,
        HealthState::Degraded => 1,
        HealthState::Offline => 2,
    }
}

fn compare_latency(lhs: Option<f64>, rhs: Option<f64>) -> Ordering {
    match (lhs, rhs) {
        (Some(left), Some(right)) => left.total_cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
