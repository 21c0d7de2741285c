//! Request payloads and read models exposed by the coordinator.

use crate::agent::domain::{
    Agent, AgentDomainError, AgentEndpoint, AgentId, AgentKind, AgentStatus, CapabilityTag,
    ConcurrencyLimit, HealthState, HttpEndpoint, RemoteShellEndpoint, RemoteShellParams,
    SessionSetup,
};
use crate::task::domain::{Task, TaskFailure, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;

/// Default bound on an HTTP agent request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default bound on a remote tool invocation, in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Default bound on establishing a remote session, in seconds.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

/// How the coordinator reaches a new agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentConnection {
    /// HTTP model server.
    Http {
        /// Base URL of the server.
        endpoint: String,
        /// Model name sent with each request.
        model: String,
        /// Per-request bound in seconds.
        request_timeout_seconds: u64,
        /// Generation and status path overrides.
        paths: Option<(String, String)>,
    },
    /// Command-line tool invoked over a remote shell.
    RemoteShell {
        /// Remote host name or address.
        host: String,
        /// Session-setup parameters.
        session_setup: SessionSetup,
        /// Tool invocation template.
        tool_invocation_template: String,
        /// Model name substituted into the template.
        model: String,
        /// Bound on the tool's runtime in seconds.
        command_timeout_seconds: u64,
        /// Bound on session setup in seconds.
        session_timeout_seconds: u64,
    },
}

impl AgentConnection {
    /// Describes an HTTP agent with the default request timeout.
    #[must_use]
    pub fn http(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            model: model.into(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            paths: None,
        }
    }

    /// Describes a remote shell agent with default timeouts.
    #[must_use]
    pub fn remote_shell(
        host: impl Into<String>,
        tool_invocation_template: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::RemoteShell {
            host: host.into(),
            session_setup: SessionSetup::default(),
            tool_invocation_template: tool_invocation_template.into(),
            model: model.into(),
            command_timeout_seconds: DEFAULT_COMMAND_TIMEOUT_SECS,
            session_timeout_seconds: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }

    fn into_endpoint(self) -> Result<AgentEndpoint, AgentDomainError> {
        match self {
            Self::Http {
                endpoint,
                model,
                request_timeout_seconds,
                paths,
            } => {
                let http = HttpEndpoint::new(endpoint, model, request_timeout_seconds)?;
                Ok(AgentEndpoint::Http(match paths {
                    Some((generate, status)) => http.with_paths(generate, status),
                    None => http,
                }))
            }
            Self::RemoteShell {
                host,
                session_setup,
                tool_invocation_template,
                model,
                command_timeout_seconds,
                session_timeout_seconds,
            } => Ok(AgentEndpoint::RemoteShell(RemoteShellEndpoint::new(
                RemoteShellParams {
                    host,
                    session_setup,
                    invocation_template: tool_invocation_template,
                    model,
                    command_timeout_secs: command_timeout_seconds,
                    session_timeout_secs: session_timeout_seconds,
                },
            )?)),
        }
    }
}

/// Request payload for registering an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAgentRequest {
    id: String,
    capability: String,
    concurrency_limit: u32,
    connection: AgentConnection,
}

impl RegisterAgentRequest {
    /// Creates a request with a concurrency limit of one.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        capability: impl Into<String>,
        connection: AgentConnection,
    ) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            concurrency_limit: 1,
            connection,
        }
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Returns the requested agent identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Validates the request into a fresh agent record.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError`] when any field fails validation.
    pub fn into_agent(self, clock: &impl Clock) -> Result<Agent, AgentDomainError> {
        let Self {
            id,
            capability,
            concurrency_limit,
            connection,
        } = self;
        Ok(Agent::new(
            AgentId::new(id)?,
            CapabilityTag::new(capability)?,
            connection.into_endpoint()?,
            ConcurrencyLimit::new(concurrency_limit)?,
            clock,
        ))
    }
}

/// Read model of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSummary {
    /// Agent identifier.
    pub id: AgentId,
    /// Execution substrate.
    pub kind: AgentKind,
    /// Declared capability.
    pub capability: CapabilityTag,
    /// Routing status.
    pub status: AgentStatus,
    /// Health state.
    pub health: HealthState,
    /// Executions in flight.
    pub in_flight: u32,
    /// Concurrency limit.
    pub concurrency_limit: u32,
    /// URL or host the agent is reached at.
    pub target: String,
    /// Configured model.
    pub model: String,
    /// Smoothed task latency in milliseconds.
    pub latency_estimate_ms: Option<f64>,
    /// Last successful contact.
    pub last_seen: Option<DateTime<Utc>>,
    /// Most recent failure message.
    pub last_error: Option<String>,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id().clone(),
            kind: agent.kind(),
            capability: agent.capability().clone(),
            status: agent.status(),
            health: agent.health(),
            in_flight: agent.in_flight(),
            concurrency_limit: agent.concurrency_limit().value(),
            target: agent.endpoint().target().to_owned(),
            model: agent.endpoint().model().to_owned(),
            latency_estimate_ms: agent.latency_estimate_ms(),
            last_seen: agent.last_seen(),
            last_error: agent.last_error().map(str::to_owned),
        }
    }
}

/// Read model of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    /// Task identifier.
    pub id: TaskId,
    /// Required capability.
    pub capability: CapabilityTag,
    /// Priority, higher is more urgent.
    pub priority: u8,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Agent holding or having held the task.
    pub assigned_agent: Option<AgentId>,
    /// Output of a completed task.
    pub result: Option<String>,
    /// Latest classified failure.
    pub failure: Option<TaskFailure>,
    /// Failed attempts so far.
    pub failed_attempts: u32,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time the current attempt started running.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the task reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id(),
            capability: task.capability().clone(),
            priority: task.priority().value(),
            status: task.status(),
            assigned_agent: task.assigned_agent().cloned(),
            result: task.result().map(str::to_owned),
            failure: task.failure().cloned(),
            failed_attempts: task.failed_attempts(),
            created_at: task.created_at(),
            started_at: task.started_at(),
            finished_at: task.finished_at(),
        }
    }
}
