//! Agent registry: the source of truth for agent load and health.
//!
//! Each agent record sits behind its own mutex so slot reservations from the
//! dispatcher and status updates from the health monitor serialize per agent
//! without contending across the fleet. The map lock is only held long enough
//! to find or insert an entry.

use crate::agent::{
    domain::{
        Agent, AgentId, AgentKind, AgentStatus, CapabilityTag, HealthPolicy, HealthTransition,
    },
    ports::{AgentStore, AgentStoreError},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default weight given to a new latency sample in the moving average.
pub const DEFAULT_LATENCY_SMOOTHING: f64 = 0.3;

/// Registry-level errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An agent with the same identifier is already registered.
    #[error("duplicate agent identifier: {0}")]
    DuplicateAgent(AgentId),

    /// No agent is registered under the identifier.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The agent still has executions in flight.
    #[error("agent {agent_id} has {in_flight} executions in flight")]
    AgentBusy {
        /// Agent identifier.
        agent_id: AgentId,
        /// In-flight count at the time of the request.
        in_flight: u32,
    },

    /// Every concurrency slot of the agent is taken.
    #[error("agent {0} has no free concurrency slot")]
    AgentSaturated(AgentId),

    /// An internal lock was poisoned by a panicking holder.
    #[error("agent registry lock poisoned: {0}")]
    LockPoisoned(String),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Store(#[from] AgentStoreError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Optional criteria for listing agents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFilter {
    /// Only agents declaring this capability.
    pub capability: Option<CapabilityTag>,
    /// Only agents of this kind.
    pub kind: Option<AgentKind>,
    /// Only agents currently reporting this status.
    pub status: Option<AgentStatus>,
}

impl AgentFilter {
    /// Returns whether `agent` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, agent: &Agent) -> bool {
        self.capability
            .as_ref()
            .is_none_or(|capability| agent.capability() == capability)
            && self.kind.is_none_or(|kind| agent.kind() == kind)
            && self.status.is_none_or(|status| agent.status() == status)
    }
}

type AgentCell = Arc<Mutex<Agent>>;

/// In-memory agent registry backed by an [`AgentStore`].
pub struct AgentRegistry<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    policy: HealthPolicy,
    latency_smoothing: f64,
    agents: RwLock<HashMap<AgentId, AgentCell>>,
}

fn lock_agent(cell: &AgentCell) -> RegistryResult<MutexGuard<'_, Agent>> {
    cell.lock()
        .map_err(|err| RegistryError::LockPoisoned(err.to_string()))
}

impl<S, C> AgentRegistry<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    /// Creates an empty registry with default health thresholds.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            store,
            clock,
            policy: HealthPolicy::default(),
            latency_smoothing: DEFAULT_LATENCY_SMOOTHING,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the health thresholds.
    #[must_use]
    pub const fn with_health_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Overrides the latency moving-average weight.
    #[must_use]
    pub const fn with_latency_smoothing(mut self, smoothing: f64) -> Self {
        self.latency_smoothing = smoothing;
        self
    }

    /// Returns the health thresholds in force.
    #[must_use]
    pub const fn health_policy(&self) -> HealthPolicy {
        self.policy
    }

    fn cell(&self, id: &AgentId) -> RegistryResult<AgentCell> {
        let agents = self
            .agents
            .read()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))?;
        agents
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn cells(&self) -> RegistryResult<Vec<AgentCell>> {
        let agents = self
            .agents
            .read()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))?;
        Ok(agents.values().cloned().collect())
    }

    fn snapshots(&self, keep: impl Fn(&Agent) -> bool) -> RegistryResult<Vec<Agent>> {
        let mut selected = Vec::new();
        for cell in self.cells()? {
            let agent = lock_agent(&cell)?;
            if keep(&agent) {
                selected.push(agent.clone());
            }
        }
        selected.sort_by(|lhs, rhs| lhs.id().cmp(rhs.id()));
        Ok(selected)
    }

    /// Loads every stored agent; returns how many were added.
    ///
    /// Agents already present in memory are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the store cannot be read.
    pub async fn load(&self) -> RegistryResult<usize> {
        let stored = self.store.load_all().await?;
        let mut agents = self
            .agents
            .write()
            .map_err(|err| RegistryError::LockPoisoned(err.to_string()))?;
        let mut added = 0;
        for agent in stored {
            if agents.contains_key(agent.id()) {
                continue;
            }
            agents.insert(agent.id().clone(), Arc::new(Mutex::new(agent)));
            added += 1;
        }
        info!(agents = added, "loaded agents from store");
        Ok(added)
    }

    /// Registers a new agent and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAgent`] when the identifier is taken
    /// or [`RegistryError::Store`] when persistence fails (the registration
    /// is rolled back).
    pub async fn register(&self, agent: Agent) -> RegistryResult<Agent> {
        let id = agent.id().clone();
        {
            let mut agents = self
                .agents
                .write()
                .map_err(|err| RegistryError::LockPoisoned(err.to_string()))?;
            if agents.contains_key(&id) {
                return Err(RegistryError::DuplicateAgent(id));
            }
            agents.insert(id.clone(), Arc::new(Mutex::new(agent.clone())));
        }

        if let Err(err) = self.store.put(&agent).await {
            let mut agents = self
                .agents
                .write()
                .map_err(|poison| RegistryError::LockPoisoned(poison.to_string()))?;
            agents.remove(&id);
            return Err(err.into());
        }

        info!(agent_id = %id, kind = %agent.kind(), capability = %agent.capability(), "agent registered");
        Ok(agent)
    }

    /// Removes an idle agent and deletes its stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents,
    /// [`RegistryError::AgentBusy`] while executions are in flight, or
    /// [`RegistryError::Store`] when the record cannot be deleted (the agent
    /// is restored in memory).
    pub async fn unregister(&self, id: &AgentId) -> RegistryResult<Agent> {
        let (cell, snapshot) = {
            let mut agents = self
                .agents
                .write()
                .map_err(|err| RegistryError::LockPoisoned(err.to_string()))?;
            let cell = agents
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            let snapshot = {
                let agent = lock_agent(&cell)?;
                if agent.in_flight() > 0 {
                    return Err(RegistryError::AgentBusy {
                        agent_id: id.clone(),
                        in_flight: agent.in_flight(),
                    });
                }
                agent.clone()
            };
            agents.remove(id);
            (cell, snapshot)
        };

        if let Err(err) = self.store.delete(id).await {
            let mut agents = self
                .agents
                .write()
                .map_err(|poison| RegistryError::LockPoisoned(poison.to_string()))?;
            agents.entry(id.clone()).or_insert(cell);
            return Err(err.into());
        }

        info!(agent_id = %id, "agent unregistered");
        Ok(snapshot)
    }

    /// Returns a snapshot of one agent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents.
    pub fn get(&self, id: &AgentId) -> RegistryResult<Agent> {
        let cell = self.cell(id)?;
        let agent = lock_agent(&cell)?;
        Ok(agent.clone())
    }

    /// Lists agents matching `filter`, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when internal state is
    /// unusable.
    pub fn list(&self, filter: &AgentFilter) -> RegistryResult<Vec<Agent>> {
        self.snapshots(|agent| filter.matches(agent))
    }

    /// Lists routable agents declaring `capability`.
    ///
    /// Routable means `online` or `degraded`; saturated agents are included
    /// so callers can tell "busy" from "absent".
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when internal state is
    /// unusable.
    pub fn list_by_capability(&self, capability: &CapabilityTag) -> RegistryResult<Vec<Agent>> {
        self.snapshots(|agent| agent.capability() == capability && agent.health().is_routable())
    }

    /// Returns whether a routable agent of `capability` exists outside
    /// `excluded`, regardless of its current load.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LockPoisoned`] when internal state is
    /// unusable.
    pub fn has_alternate(
        &self,
        capability: &CapabilityTag,
        excluded: &[AgentId],
    ) -> RegistryResult<bool> {
        Ok(self
            .list_by_capability(capability)?
            .iter()
            .any(|agent| !excluded.contains(agent.id())))
    }

    /// Atomically takes a concurrency slot and returns the updated snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentSaturated`] when every slot is taken or
    /// [`RegistryError::NotFound`] for unknown agents.
    pub fn reserve_slot(&self, id: &AgentId) -> RegistryResult<Agent> {
        let cell = self.cell(id)?;
        let mut agent = lock_agent(&cell)?;
        if !agent.try_reserve() {
            return Err(RegistryError::AgentSaturated(id.clone()));
        }
        debug!(agent_id = %id, in_flight = agent.in_flight(), "slot reserved");
        Ok(agent.clone())
    }

    /// Frees a concurrency slot.
    ///
    /// Releasing an agent with no slot held is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents.
    pub fn release_slot(&self, id: &AgentId) -> RegistryResult<()> {
        let cell = self.cell(id)?;
        let mut agent = lock_agent(&cell)?;
        if agent.release() {
            debug!(agent_id = %id, in_flight = agent.in_flight(), "slot released");
        }
        Ok(())
    }

    /// Records a successful contact; persists the agent on a status change.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents or
    /// [`RegistryError::Store`] when persisting a transition fails.
    pub async fn record_success(
        &self,
        id: &AgentId,
        latency: Duration,
    ) -> RegistryResult<Option<HealthTransition>> {
        let cell = self.cell(id)?;
        let (transition, snapshot) = {
            let mut agent = lock_agent(&cell)?;
            let transition = agent.record_success(latency, &*self.clock);
            (transition, agent.clone())
        };
        self.persist_transition(&snapshot, transition).await
    }

    /// Records a failed contact; persists the agent on a status change.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents or
    /// [`RegistryError::Store`] when persisting a transition fails.
    pub async fn record_failure(
        &self,
        id: &AgentId,
        error: &str,
    ) -> RegistryResult<Option<HealthTransition>> {
        let cell = self.cell(id)?;
        let (transition, snapshot) = {
            let mut agent = lock_agent(&cell)?;
            let transition = agent.record_failure(self.policy, error, &*self.clock);
            (transition, agent.clone())
        };
        self.persist_transition(&snapshot, transition).await
    }

    /// Folds a completed task's latency into the agent's moving average.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown agents.
    pub fn observe_latency(&self, id: &AgentId, latency: Duration) -> RegistryResult<()> {
        let cell = self.cell(id)?;
        let mut agent = lock_agent(&cell)?;
        agent.observe_latency(latency, self.latency_smoothing);
        Ok(())
    }

    async fn persist_transition(
        &self,
        agent: &Agent,
        transition: Option<HealthTransition>,
    ) -> RegistryResult<Option<HealthTransition>> {
        if let Some(change) = transition {
            info!(
                agent_id = %agent.id(),
                from = %change.from,
                to = %change.to,
                consecutive_failures = agent.consecutive_failures(),
                "agent health changed"
            );
            self.store.put(agent).await?;
        }
        Ok(transition)
    }
}
