//! Executor for agents reached by running a tool over a remote shell.

use super::pool::{SessionLease, SessionPool};
use crate::agent::domain::{Agent, AgentEndpoint, RemoteShellEndpoint};
use crate::execution::{
    domain::{ExecutionError, ExecutionOutput, TimeoutPhase},
    ports::{CommandOutput, Executor, SessionError},
};
use crate::shell::{InvocationVars, payload_text, render_invocation};
use crate::task::domain::Task;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Command used for health probes when none is configured.
pub const DEFAULT_PROBE_COMMAND: &str = "true";

/// Longest stderr excerpt attached to a remote error.
const MAX_ERROR_DETAIL: usize = 2048;

/// Runs rendered tool invocations over pooled sessions.
///
/// An execution that finds its agent's sessions all leased waits up to the
/// session timeout for one to come back; a health check never waits.
/// Cancellation is advisory: a command already running on the remote host
/// is left to finish, and its session returns to the pool when it does.
pub struct RemoteExecutor {
    pool: Arc<SessionPool>,
    probe_command: String,
}

impl RemoteExecutor {
    /// Creates an executor drawing sessions from `pool`.
    #[must_use]
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            pool,
            probe_command: DEFAULT_PROBE_COMMAND.to_owned(),
        }
    }

    /// Overrides the probe command.
    #[must_use]
    pub fn with_probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }

    /// Returns the shared session pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Runs `command` on a leased session under `limit`, settling the lease
    /// according to the outcome.
    async fn run_leased(
        &self,
        lease: SessionLease,
        command: &str,
        limit: Duration,
        phase: TimeoutPhase,
    ) -> Result<CommandOutput, ExecutionError> {
        match tokio::time::timeout(limit, lease.run(command)).await {
            Err(_) => {
                warn!(host = lease.host(), session = %lease.id(), %phase, "remote command timed out");
                self.pool.discard(lease).await;
                Err(ExecutionError::Timeout {
                    phase,
                    after: limit,
                })
            }
            Ok(Err(SessionError::Broken(detail) | SessionError::Unreachable(detail))) => {
                warn!(host = lease.host(), session = %lease.id(), error = %detail, "remote session failed");
                self.pool.discard(lease).await;
                Err(ExecutionError::Unreachable(detail))
            }
            Ok(Ok(output)) if output.success() => {
                self.pool.release(lease).await;
                Ok(output)
            }
            Ok(Ok(output)) => {
                self.pool.release_after_failure(lease).await;
                Err(ExecutionError::RemoteError(failure_detail(&output)))
            }
        }
    }
}

fn remote_endpoint(agent: &Agent) -> Result<&RemoteShellEndpoint, ExecutionError> {
    match agent.endpoint() {
        AgentEndpoint::RemoteShell(endpoint) => Ok(endpoint),
        AgentEndpoint::Http(_) => Err(ExecutionError::RemoteError(format!(
            "agent {} is not a remote shell agent",
            agent.id()
        ))),
    }
}

fn failure_detail(output: &CommandOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| "killed by signal".to_owned(), |code| format!("exit status {code}"));
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        return status;
    }
    let excerpt: String = stderr.chars().take(MAX_ERROR_DETAIL).collect();
    format!("{status}: {excerpt}")
}

#[async_trait]
impl Executor for RemoteExecutor {
    async fn execute(
        &self,
        agent: &Agent,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let endpoint = remote_endpoint(agent)?;
        let payload = payload_text(task.payload());
        let task_id = task.id().to_string();
        let command = render_invocation(
            endpoint.invocation_template(),
            &InvocationVars {
                payload: &payload,
                model: endpoint.model(),
                task_id: &task_id,
                capability: task.capability().as_str(),
            },
        )
        .map_err(|err| ExecutionError::RemoteError(err.to_string()))?;

        let started = Instant::now();
        let lease = self
            .pool
            .acquire(
                agent.id(),
                endpoint,
                agent.concurrency_limit().value(),
                endpoint.session_timeout(),
            )
            .await?;
        debug!(task_id = %task.id(), agent_id = %agent.id(), session = %lease.id(), "running remote invocation");
        let output = self
            .run_leased(lease, &command, endpoint.command_timeout(), TimeoutPhase::Command)
            .await?;
        if cancel.is_cancelled() {
            debug!(task_id = %task.id(), "remote command finished after cancellation");
        }
        Ok(ExecutionOutput {
            output: output.stdout,
            latency: started.elapsed(),
        })
    }

    async fn probe(&self, agent: &Agent, timeout: Duration) -> Result<Duration, ExecutionError> {
        let endpoint = remote_endpoint(agent)?;
        let started = Instant::now();
        let lease = self
            .pool
            .acquire(
                agent.id(),
                endpoint,
                agent.concurrency_limit().value(),
                Duration::ZERO,
            )
            .await?;
        self.run_leased(lease, &self.probe_command, timeout, TimeoutPhase::Probe)
            .await?;
        Ok(started.elapsed())
    }
}
