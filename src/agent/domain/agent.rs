//! Agent aggregate root.

use super::{
    AgentEndpoint, AgentId, AgentKind, AgentStatus, CapabilityTag, ConcurrencyLimit,
    HealthPolicy, HealthState, HealthTransition,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// Agent aggregate root.
///
/// The in-flight counter is runtime state and is never persisted: an agent
/// reloaded from storage starts with every slot free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    id: AgentId,
    capability: CapabilityTag,
    endpoint: AgentEndpoint,
    concurrency_limit: ConcurrencyLimit,
    #[serde(skip)]
    in_flight: u32,
    health: HealthState,
    consecutive_failures: u32,
    latency_ewma_ms: Option<f64>,
    last_latency_ms: Option<u64>,
    last_error: Option<String>,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a newly registered agent in the `online` health state.
    #[must_use]
    pub fn new(
        id: AgentId,
        capability: CapabilityTag,
        endpoint: AgentEndpoint,
        concurrency_limit: ConcurrencyLimit,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id,
            capability,
            endpoint,
            concurrency_limit,
            in_flight: 0,
            health: HealthState::Online,
            consecutive_failures: 0,
            latency_ewma_ms: None,
            last_latency_ms: None,
            last_error: None,
            last_seen: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns the agent identifier.
    #[must_use]
    pub const fn id(&self) -> &AgentId {
        &self.id
    }

    /// Returns the declared capability tag.
    #[must_use]
    pub const fn capability(&self) -> &CapabilityTag {
        &self.capability
    }

    /// Returns the connection descriptor.
    #[must_use]
    pub const fn endpoint(&self) -> &AgentEndpoint {
        &self.endpoint
    }

    /// Returns the execution substrate.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        self.endpoint.kind()
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub const fn concurrency_limit(&self) -> ConcurrencyLimit {
        self.concurrency_limit
    }

    /// Returns the number of executions currently in flight.
    #[must_use]
    pub const fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Returns the health state.
    #[must_use]
    pub const fn health(&self) -> HealthState {
        self.health
    }

    /// Returns the externally visible status.
    #[must_use]
    pub const fn status(&self) -> AgentStatus {
        if self.in_flight >= self.concurrency_limit.value() {
            return AgentStatus::Busy;
        }
        match self.health {
            HealthState::Online => AgentStatus::Online,
            HealthState::Degraded => AgentStatus::Degraded,
            HealthState::Offline => AgentStatus::Offline,
        }
    }

    /// Returns the number of consecutive failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the smoothed task latency in milliseconds, if any task has
    /// completed.
    #[must_use]
    pub const fn latency_estimate_ms(&self) -> Option<f64> {
        self.latency_ewma_ms
    }

    /// Returns the latency of the most recent successful contact.
    #[must_use]
    pub const fn last_latency_ms(&self) -> Option<u64> {
        self.last_latency_ms
    }

    /// Returns the most recent failure message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the timestamp of the most recent successful contact.
    #[must_use]
    pub const fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether at least one concurrency slot is free.
    #[must_use]
    pub const fn has_spare_capacity(&self) -> bool {
        self.in_flight < self.concurrency_limit.value()
    }

    /// Compares load ratios (`in_flight / limit`) without floating point.
    #[must_use]
    pub fn compare_load(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.in_flight) * u64::from(other.concurrency_limit.value());
        let rhs = u64::from(other.in_flight) * u64::from(self.concurrency_limit.value());
        lhs.cmp(&rhs)
    }

    /// Takes one concurrency slot; returns `false` when saturated.
    pub const fn try_reserve(&mut self) -> bool {
        if !self.has_spare_capacity() {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Frees one concurrency slot; returns `false` when none was held.
    pub const fn release(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        self.in_flight -= 1;
        true
    }

    /// Records a successful contact and returns the agent to `online`.
    pub fn record_success(
        &mut self,
        latency: Duration,
        clock: &impl Clock,
    ) -> Option<HealthTransition> {
        let from = self.health;
        self.consecutive_failures = 0;
        self.health = HealthState::Online;
        self.last_latency_ms = Some(duration_millis(latency));
        self.last_error = None;
        self.last_seen = Some(clock.utc());
        self.touch(clock);
        transition(from, self.health)
    }

    /// Records a failed contact, applying the health thresholds.
    pub fn record_failure(
        &mut self,
        policy: HealthPolicy,
        error: impl Into<String>,
        clock: &impl Clock,
    ) -> Option<HealthTransition> {
        let from = self.health;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.health = policy.state_for_failures(self.consecutive_failures);
        self.last_error = Some(error.into());
        self.touch(clock);
        transition(from, self.health)
    }

    /// Folds a completed task's latency into the moving average.
    ///
    /// `smoothing` is the weight of the new sample, clamped to `(0, 1]`.
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        reason = "latency estimate is an exponentially weighted moving average"
    )]
    pub fn observe_latency(&mut self, latency: Duration, smoothing: f64) {
        let sample = duration_millis(latency) as f64;
        let alpha = smoothing.clamp(f64::MIN_POSITIVE, 1.0);
        self.latency_ewma_ms = Some(match self.latency_ewma_ms {
            Some(previous) => alpha * sample + (1.0 - alpha) * previous,
            None => sample,
        });
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

fn transition(from: HealthState, to: HealthState) -> Option<HealthTransition> {
    (from != to).then_some(HealthTransition { from, to })
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
