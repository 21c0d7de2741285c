//! Health monitor service.

use crate::agent::{
    domain::{AgentId, AgentStatus, HealthState},
    ports::AgentStore,
    services::{AgentFilter, AgentRegistry, RegistryResult},
};
use crate::execution::{domain::ExecutionError, services::ExecutorSet};
use futures_util::future::join_all;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between probe rounds.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a single probe said about an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The agent answered within the probe timeout.
    Healthy(Duration),
    /// The agent failed to answer.
    Unhealthy(ExecutionError),
    /// The probe could not run, for example because the host's session pool
    /// was full; health is left unchanged.
    Inconclusive(ExecutionError),
}

/// Health view of one agent returned by on-demand checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckReport {
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Status after the probe.
    pub status: AgentStatus,
    /// Health state after the probe.
    pub health: HealthState,
    /// Latency of the most recent successful probe.
    pub last_latency_ms: Option<u64>,
    /// Most recent failure message, cleared by a success.
    pub last_error: Option<String>,
    /// Failures recorded since the last success.
    pub consecutive_failures: u32,
}

/// Probes agents on a fixed interval, independent of task traffic.
pub struct HealthMonitor<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    registry: Arc<AgentRegistry<S, C>>,
    executors: ExecutorSet,
    probe_timeout: Duration,
    interval: Duration,
    online: Arc<Notify>,
}

impl<S, C> HealthMonitor<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    /// Creates a monitor with default interval and timeout.
    ///
    /// `online` is notified whenever an agent returns to `online`.
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry<S, C>>,
        executors: ExecutorSet,
        online: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            executors,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
            online,
        }
    }

    /// Sets the bound on a single probe.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the interval between probe rounds.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probes one agent and records the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`crate::agent::services::RegistryError::NotFound`] for
    /// unknown agents, or a store error when persisting a health transition
    /// fails.
    pub async fn probe_agent(&self, id: &AgentId) -> RegistryResult<ProbeOutcome> {
        let agent = self.registry.get(id)?;
        let executor = self.executors.for_kind(agent.kind());
        let outcome = match executor.probe(&agent, self.probe_timeout).await {
            Ok(latency) => ProbeOutcome::Healthy(latency),
            Err(err @ (ExecutionError::PoolExhausted { .. } | ExecutionError::Cancelled)) => {
                ProbeOutcome::Inconclusive(err)
            }
            Err(err) => ProbeOutcome::Unhealthy(err),
        };

        match &outcome {
            ProbeOutcome::Healthy(latency) => {
                let transition = self.registry.record_success(id, *latency).await?;
                if transition.is_some_and(|change| change.to == HealthState::Online) {
                    self.online.notify_one();
                }
            }
            ProbeOutcome::Unhealthy(err) => {
                debug!(agent_id = %id, error = %err, "probe failed");
                self.registry.record_failure(id, &err.to_string()).await?;
            }
            ProbeOutcome::Inconclusive(err) => {
                debug!(agent_id = %id, error = %err, "probe inconclusive");
            }
        }
        Ok(outcome)
    }

    /// Probes one agent and reports its resulting health.
    ///
    /// # Errors
    ///
    /// Same as [`Self::probe_agent`].
    pub async fn check(&self, id: &AgentId) -> RegistryResult<HealthCheckReport> {
        self.probe_agent(id).await?;
        let agent = self.registry.get(id)?;
        Ok(HealthCheckReport {
            agent_id: agent.id().clone(),
            status: agent.status(),
            health: agent.health(),
            last_latency_ms: agent.last_latency_ms(),
            last_error: agent.last_error().map(str::to_owned),
            consecutive_failures: agent.consecutive_failures(),
        })
    }

    /// Probes every registered agent concurrently.
    ///
    /// Returns the number of agents probed. Agents unregistered during the
    /// round are skipped.
    pub async fn probe_all(&self) -> usize {
        let agents = match self.registry.list(&AgentFilter::default()) {
            Ok(agents) => agents,
            Err(err) => {
                warn!(error = %err, "unable to list agents for probing");
                return 0;
            }
        };
        let ids: Vec<AgentId> = agents.iter().map(|agent| agent.id().clone()).collect();
        let results = join_all(ids.iter().map(|id| self.probe_agent(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(err) = result {
                warn!(agent_id = %id, error = %err, "probe could not be recorded");
            }
        }
        ids.len()
    }

    /// Runs probe rounds until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "health monitor started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let probed = self.probe_all().await;
                    debug!(probed, "health probe round finished");
                }
            }
        }
        info!("health monitor stopped");
    }
}
