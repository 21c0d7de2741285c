//! Task aggregate root and lifecycle state machine.

use super::{ParseTaskStatusError, Priority, TaskDomainError, TaskFailure, TaskId};
use crate::agent::domain::{AgentId, CapabilityTag};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for an agent.
    Pending,
    /// An agent slot is reserved; execution has not started.
    Assigned,
    /// The executor call is in flight.
    Running,
    /// Execution succeeded.
    Completed,
    /// Execution failed and will not be retried.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns whether a task in this status references an agent.
    #[must_use]
    pub const fn holds_agent(self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::Running | Self::Completed | Self::Failed
        )
    }

    /// Returns whether the lifecycle permits moving to `target`.
    ///
    /// The only backward move is to `pending` when a dispatch is retried.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(target, Self::Assigned | Self::Cancelled),
            Self::Assigned => matches!(
                target,
                Self::Running | Self::Pending | Self::Failed | Self::Cancelled
            ),
            Self::Running => matches!(
                target,
                Self::Completed | Self::Failed | Self::Pending | Self::Cancelled
            ),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    capability: CapabilityTag,
    priority: Priority,
    payload: Value,
    status: TaskStatus,
    assigned_agent: Option<AgentId>,
    result: Option<String>,
    failure: Option<TaskFailure>,
    failed_attempts: u32,
    excluded_agents: Vec<AgentId>,
    sequence: u64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task.
    #[must_use]
    pub fn new(
        capability: CapabilityTag,
        priority: Priority,
        payload: Value,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            capability,
            priority,
            payload,
            status: TaskStatus::Pending,
            assigned_agent: None,
            result: None,
            failure: None,
            failed_attempts: 0,
            excluded_agents: Vec::new(),
            sequence: 0,
            created_at: timestamp,
            started_at: None,
            finished_at: None,
            updated_at: timestamp,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the required capability.
    #[must_use]
    pub const fn capability(&self) -> &CapabilityTag {
        &self.capability
    }

    /// Returns the priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the caller-supplied payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the assigned agent, if any.
    #[must_use]
    pub const fn assigned_agent(&self) -> Option<&AgentId> {
        self.assigned_agent.as_ref()
    }

    /// Returns the execution output of a completed task.
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Returns the most recent failure classification.
    ///
    /// A retried task keeps its previous failure until it finishes.
    #[must_use]
    pub const fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    /// Returns how many attempts ended in a retryable failure.
    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Returns agents this task must not be dispatched to again.
    #[must_use]
    pub fn excluded_agents(&self) -> &[AgentId] {
        &self.excluded_agents
    }

    /// Returns the submission sequence number used for FIFO ordering.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when execution last started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the task reached a terminal status.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) const fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Binds the task to an agent.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless pending.
    pub fn assign(&mut self, agent_id: AgentId, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Assigned, clock)?;
        self.assigned_agent = Some(agent_id);
        Ok(())
    }

    /// Marks the executor call as in flight.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless assigned.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Running, clock)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// Records a successful result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless running.
    pub fn complete(
        &mut self,
        result: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Completed, clock)?;
        self.result = Some(result.into());
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    /// Records a terminal failure.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless assigned or
    /// running.
    pub fn fail(&mut self, failure: TaskFailure, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Failed, clock)?;
        self.failure = Some(failure);
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    /// Cancels the task and returns the agent it was bound to, if any.
    ///
    /// Cancelling an in-flight task is logical only: the caller is
    /// responsible for signalling the executor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] for terminal tasks.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<Option<AgentId>, TaskDomainError> {
        self.transition(TaskStatus::Cancelled, clock)?;
        self.finished_at = Some(self.updated_at);
        Ok(self.assigned_agent.take())
    }

    /// Returns the task to `pending` after a retryable failure.
    ///
    /// The failed agent is excluded from further dispatch and the attempt
    /// counter advances.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless assigned or
    /// running.
    pub fn retry_after(
        &mut self,
        failure: TaskFailure,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Pending, clock)?;
        if !self.excluded_agents.contains(&failure.agent_id) {
            self.excluded_agents.push(failure.agent_id.clone());
        }
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.failure = Some(failure);
        self.assigned_agent = None;
        self.started_at = None;
        Ok(())
    }

    /// Returns the task to `pending` without consuming an attempt.
    ///
    /// Used for transient dispatch conditions and crash recovery.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless assigned or
    /// running.
    pub fn release_to_pending(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Pending, clock)?;
        self.assigned_agent = None;
        self.started_at = None;
        Ok(())
    }

    fn transition(&mut self, target: TaskStatus, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(TaskDomainError::InvalidStateTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = clock.utc();
        Ok(())
    }
}
