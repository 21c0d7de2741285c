//! Coordinator service: the dispatch loop and the public operations.

use super::{
    error::{CoordinatorError, CoordinatorResult},
    requests::{AgentSummary, RegisterAgentRequest, TaskView},
    retry::{RetryDecision, RetryPolicy},
};
use crate::agent::{
    domain::{Agent, AgentId, CapabilityTag},
    ports::AgentStore,
    services::{AgentFilter, AgentRegistry, AgentSelector, SelectionError},
};
use crate::execution::{
    domain::{ExecutionError, ExecutionOutput},
    services::ExecutorSet,
};
use crate::health::{HealthCheckReport, HealthMonitor};
use crate::task::{
    domain::{FailureKind, Priority, Task, TaskFailure, TaskId, TaskStatus},
    services::{QueueError, TaskQueue},
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Tuning for the dispatch loop and its maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Fallback interval between dispatch passes.
    pub tick_interval: Duration,
    /// Retry budget for unreachable and timed-out executions.
    pub retry: RetryPolicy,
    /// How long finished tasks stay queryable.
    pub retention: Duration,
    /// Interval between retention purges.
    pub maintenance_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            retention: Duration::from_secs(24 * 60 * 60),
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

/// Routes submitted tasks to agents and tracks them to completion.
///
/// Executions run as independent tokio tasks, so dispatching needs a shared
/// handle: wrap the coordinator in an [`Arc`].
pub struct Coordinator<S, C>
where
    S: AgentStore,
    C: Clock + Send + Sync,
{
    registry: Arc<AgentRegistry<S, C>>,
    selector: AgentSelector<S, C>,
    queue: TaskQueue<C>,
    executors: ExecutorSet,
    health: HealthMonitor<S, C>,
    clock: Arc<C>,
    settings: DispatchSettings,
    wake: Arc<Notify>,
    in_flight: Mutex<HashMap<TaskId, CancellationToken>>,
    tracker: TaskTracker,
}

impl<S, C> Coordinator<S, C>
where
    S: AgentStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a coordinator over `registry` with default settings.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry<S, C>>, executors: ExecutorSet, clock: Arc<C>) -> Self {
        let wake = Arc::new(Notify::new());
        Self {
            selector: AgentSelector::new(Arc::clone(&registry)),
            health: HealthMonitor::new(Arc::clone(&registry), executors.clone(), Arc::clone(&wake)),
            queue: TaskQueue::new(Arc::clone(&clock)),
            registry,
            executors,
            clock,
            settings: DispatchSettings::default(),
            wake,
            in_flight: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Replaces the dispatch settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the health probe interval and per-probe timeout.
    #[must_use]
    pub fn with_probe_settings(mut self, interval: Duration, timeout: Duration) -> Self {
        self.health = self
            .health
            .with_interval(interval)
            .with_probe_timeout(timeout);
        self
    }

    /// Returns the agent registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<AgentRegistry<S, C>> {
        &self.registry
    }

    /// Returns the health monitor, for running its probe loop.
    #[must_use]
    pub const fn health_monitor(&self) -> &HealthMonitor<S, C> {
        &self.health
    }

    /// Registers an agent and wakes the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::AgentDomain`] for invalid input and
    /// [`CoordinatorError::Registry`] for duplicates or store failures.
    pub async fn register_agent(&self, request: RegisterAgentRequest) -> CoordinatorResult<AgentId> {
        let agent = request.into_agent(&*self.clock)?;
        let registered = self.registry.register(agent).await?;
        self.wake.notify_one();
        Ok(registered.id().clone())
    }

    /// Removes an idle agent.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Registry`] with `AgentBusy` while the agent
    /// has executions in flight, or `NotFound` for unknown identifiers.
    pub async fn unregister_agent(&self, id: &AgentId) -> CoordinatorResult<()> {
        self.registry.unregister(id).await?;
        Ok(())
    }

    /// Queues a task and wakes the dispatcher.
    ///
    /// A task for a capability no agent declares is accepted and stays
    /// `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::AgentDomain`] for a blank capability and
    /// [`CoordinatorError::TaskDomain`] for a zero priority.
    pub fn submit_task(
        &self,
        capability: impl Into<String>,
        priority: u8,
        payload: Value,
    ) -> CoordinatorResult<TaskId> {
        let task = Task::new(
            CapabilityTag::new(capability)?,
            Priority::new(priority)?,
            payload,
            &*self.clock,
        );
        let id = self.queue.enqueue(task)?;
        debug!(task_id = %id, priority, "task submitted");
        self.wake.notify_one();
        Ok(id)
    }

    /// Returns the current view of a task.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Queue`] with `NotFound` for unknown or
    /// purged tasks.
    pub fn get_task(&self, id: TaskId) -> CoordinatorResult<TaskView> {
        Ok(TaskView::from(&self.queue.get(id)?))
    }

    /// Lists tasks, optionally by status, in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Queue`] when the queue is unusable.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> CoordinatorResult<Vec<TaskView>> {
        Ok(self.queue.list(status)?.iter().map(TaskView::from).collect())
    }

    /// Lists agents matching `filter`, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Registry`] when the registry is unusable.
    pub fn list_agents(&self, filter: &AgentFilter) -> CoordinatorResult<Vec<AgentSummary>> {
        Ok(self
            .registry
            .list(filter)?
            .iter()
            .map(AgentSummary::from)
            .collect())
    }

    /// Cancels a task.
    ///
    /// Pending tasks are cancelled at once. For an assigned or running task
    /// the status changes immediately and the execution is signalled; its
    /// agent slot is released when the execution returns.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Queue`] with `NotFound` or
    /// `AlreadyTerminal`; a repeated cancel reports `AlreadyTerminal` and
    /// changes nothing.
    pub fn cancel_task(&self, id: TaskId) -> CoordinatorResult<()> {
        let cancelled = self.queue.cancel(id)?;
        if let Some(token) = self.in_flight_token(id) {
            token.cancel();
        }
        info!(task_id = %id, status = %cancelled.status(), "task cancelled");
        Ok(())
    }

    /// Probes an agent now and reports its health.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Registry`] with `NotFound` for unknown
    /// agents.
    pub async fn health_check(&self, id: &AgentId) -> CoordinatorResult<HealthCheckReport> {
        self.health.check(id).await.map_err(CoordinatorError::from)
    }

    /// Loads tasks recovered after a restart.
    ///
    /// Tasks that were assigned or running go back to `pending`, so an
    /// interrupted execution may run twice.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Queue`] for duplicate identifiers.
    pub fn restore_tasks(&self, tasks: Vec<Task>) -> CoordinatorResult<usize> {
        let restored = self.queue.restore(tasks)?;
        info!(restored, "tasks restored");
        self.wake.notify_one();
        Ok(restored)
    }

    /// Drops finished tasks older than the retention window.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Queue`] when the queue is unusable.
    pub fn purge_finished(&self) -> CoordinatorResult<usize> {
        let retention = TimeDelta::from_std(self.settings.retention).unwrap_or(TimeDelta::MAX);
        let cutoff = self
            .clock
            .utc()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = self.queue.purge_finished(cutoff)?;
        if purged > 0 {
            info!(purged, "finished tasks purged");
        }
        Ok(purged)
    }

    /// Runs one dispatch pass over every capability with pending work.
    ///
    /// Returns the number of tasks handed to executors.
    pub fn dispatch_pass(self: &Arc<Self>) -> usize {
        let capabilities = match self.queue.pending_capabilities() {
            Ok(capabilities) => capabilities,
            Err(err) => {
                warn!(error = %err, "dispatch pass skipped");
                return 0;
            }
        };
        let mut dispatched = 0;
        for capability in capabilities {
            while let Some((task, agent)) = self.dispatch_next(&capability) {
                self.spawn_execution(task, agent);
                dispatched += 1;
            }
        }
        dispatched
    }

    fn dispatch_next(&self, capability: &CapabilityTag) -> Option<(Task, Agent)> {
        let mut reserved: Option<Agent> = None;
        let outcome = self.queue.dequeue_ready(capability, |task| {
            let agent = self.reserve_agent(task)?;
            let id = agent.id().clone();
            reserved = Some(agent);
            Some(id)
        });
        match (outcome, reserved) {
            (Ok(Some(task)), Some(agent)) => Some((task, agent)),
            (Ok(_), None) => None,
            (Ok(None), Some(agent)) | (Err(_), Some(agent)) => {
                warn!(agent_id = %agent.id(), capability = %capability, "dispatch aborted after reservation");
                self.release(agent.id(), true);
                None
            }
            (Err(err), None) => {
                warn!(capability = %capability, error = %err, "dequeue failed");
                None
            }
        }
    }

    /// Picks and reserves the best agent for `task`, trying candidates in
    /// rank order until a reservation sticks.
    fn reserve_agent(&self, task: &Task) -> Option<Agent> {
        let candidates = match self.selector.candidates(task.capability(), task.excluded_agents()) {
            Ok(candidates) => candidates,
            Err(SelectionError::NoAgentAvailable(_)) => return None,
            Err(err) => {
                warn!(task_id = %task.id(), error = %err, "agent selection failed");
                return None;
            }
        };
        candidates
            .iter()
            .find_map(|candidate| self.registry.reserve_slot(candidate.id()).ok())
    }

    fn spawn_execution(self: &Arc<Self>, task: Task, agent: Agent) {
        let token = CancellationToken::new();
        if let Ok(mut tokens) = self.in_flight.lock() {
            tokens.insert(task.id(), token.clone());
        }
        info!(task_id = %task.id(), agent_id = %agent.id(), "task assigned");
        let coordinator = Arc::clone(self);
        self.tracker.spawn(async move {
            coordinator.execute(task.id(), agent, token).await;
        });
    }

    async fn execute(&self, task_id: TaskId, agent: Agent, cancel: CancellationToken) {
        let agent_id = agent.id().clone();
        let wake = match self.queue.mark_running(task_id) {
            Ok(task) => {
                let executor = self.executors.for_kind(agent.kind());
                let outcome = executor.execute(&agent, &task, cancel).await;
                self.settle(&task, &agent_id, outcome).await
            }
            Err(err) => {
                debug!(task_id = %task_id, error = %err, "task left before it started");
                true
            }
        };
        if let Ok(mut tokens) = self.in_flight.lock() {
            tokens.remove(&task_id);
        }
        self.release(&agent_id, wake);
    }

    /// Records the outcome and reports whether the freed slot should wake
    /// the dispatcher.
    async fn settle(
        &self,
        task: &Task,
        agent_id: &AgentId,
        outcome: Result<ExecutionOutput, ExecutionError>,
    ) -> bool {
        let task_id = task.id();
        match outcome {
            Ok(output) => {
                if let Err(err) = self.registry.record_success(agent_id, output.latency).await {
                    warn!(agent_id = %agent_id, error = %err, "success not recorded");
                }
                if let Err(err) = self.registry.observe_latency(agent_id, output.latency) {
                    debug!(agent_id = %agent_id, error = %err, "latency not recorded");
                }
                match self.queue.complete(task_id, output.output) {
                    Ok(_) => info!(
                        task_id = %task_id,
                        agent_id = %agent_id,
                        latency_ms = u64::try_from(output.latency.as_millis()).unwrap_or(u64::MAX),
                        "task completed"
                    ),
                    Err(err) => log_late_outcome(task_id, &err),
                }
                true
            }
            Err(error) => self.handle_failure(task, agent_id, &error).await,
        }
    }

    /// Applies the retry policy to a failed execution.
    ///
    /// A task requeued after a transient failure waits for the next tick
    /// rather than waking the dispatcher, so it cannot spin against the
    /// resource that just refused it.
    async fn handle_failure(&self, task: &Task, agent_id: &AgentId, error: &ExecutionError) -> bool {
        let task_id = task.id();
        if error.counts_against_agent() {
            if let Err(err) = self.registry.record_failure(agent_id, &error.to_string()).await {
                warn!(agent_id = %agent_id, error = %err, "failure not recorded");
            }
        }
        let mut excluded = task.excluded_agents().to_vec();
        excluded.push(agent_id.clone());
        let has_alternate = self
            .registry
            .has_alternate(task.capability(), &excluded)
            .unwrap_or(false);

        let mut wake = true;
        let outcome = match self
            .settings
            .retry
            .decide(error, task.failed_attempts(), has_alternate)
        {
            RetryDecision::Ignore => {
                debug!(task_id = %task_id, "execution aborted by cancellation");
                return true;
            }
            RetryDecision::Requeue => {
                debug!(task_id = %task_id, agent_id = %agent_id, error = %error, "transient dispatch failure; requeued");
                wake = false;
                self.queue.requeue(task_id)
            }
            RetryDecision::RetryElsewhere(kind) => {
                warn!(task_id = %task_id, agent_id = %agent_id, error = %error, "retrying task on another agent");
                self.queue
                    .requeue_for_retry(task_id, self.failure(kind, error, agent_id))
            }
            RetryDecision::Fail(kind) => {
                warn!(task_id = %task_id, agent_id = %agent_id, error = %error, "task failed");
                self.queue.fail(task_id, self.failure(kind, error, agent_id))
            }
        };
        if let Err(err) = outcome {
            log_late_outcome(task_id, &err);
        }
        wake
    }

    fn failure(&self, kind: FailureKind, error: &ExecutionError, agent_id: &AgentId) -> TaskFailure {
        TaskFailure {
            kind,
            detail: error.to_string(),
            agent_id: agent_id.clone(),
            occurred_at: self.clock.utc(),
        }
    }

    fn release(&self, agent_id: &AgentId, wake: bool) {
        if let Err(err) = self.registry.release_slot(agent_id) {
            warn!(agent_id = %agent_id, error = %err, "slot release failed");
        }
        if wake {
            self.wake.notify_one();
        }
    }

    fn in_flight_token(&self, id: TaskId) -> Option<CancellationToken> {
        self.in_flight.lock().ok()?.get(&id).cloned()
    }

    /// Waits until every spawned execution has returned.
    pub async fn wait_for_executions(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Dispatches until `shutdown` fires, then cancels and awaits in-flight
    /// executions.
    ///
    /// A pass runs on every submission, released slot, and agent returning to
    /// `online`, and at least once per tick interval.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.settings.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut maintenance = tokio::time::interval(self.settings.maintenance_interval);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("dispatcher started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                _ = tick.tick() => {}
                _ = maintenance.tick() => {
                    if let Err(err) = self.purge_finished() {
                        warn!(error = %err, "retention purge failed");
                    }
                    continue;
                }
            }
            self.dispatch_pass();
        }

        let tokens: Vec<CancellationToken> = self
            .in_flight
            .lock()
            .map(|tokens| tokens.values().cloned().collect())
            .unwrap_or_default();
        for token in &tokens {
            token.cancel();
        }
        self.wait_for_executions().await;
        info!(cancelled = tokens.len(), "dispatcher stopped");
    }
}

fn log_late_outcome(task_id: TaskId, err: &QueueError) {
    match err {
        QueueError::AlreadyTerminal(_) => {
            debug!(task_id = %task_id, "discarding outcome of cancelled task");
        }
        other => warn!(task_id = %task_id, error = %other, "task outcome not recorded"),
    }
}
