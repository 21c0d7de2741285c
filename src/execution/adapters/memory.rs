//! In-memory executor and session adapters.
//!
//! Both adapters are scriptable: outcomes are queued up front and consumed
//! in order, with a default when the queue is empty. They let the
//! coordinator, health monitor, and pool run end to end without a network.

use crate::agent::domain::{Agent, AgentId, RemoteShellEndpoint};
use crate::execution::{
    domain::{ExecutionError, ExecutionOutput},
    ports::{CommandOutput, Executor, RemoteSession, SessionConnector, SessionError},
};
use crate::task::domain::{Task, TaskId};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionCall {
    /// Agent the task ran on.
    pub agent_id: AgentId,
    /// Task that was executed.
    pub task_id: TaskId,
}

#[derive(Default)]
struct Script {
    executions: HashMap<AgentId, VecDeque<Result<String, ExecutionError>>>,
    probes: HashMap<AgentId, VecDeque<Result<Duration, ExecutionError>>>,
    calls: Vec<ExecutionCall>,
}

fn poisoned(err: impl std::fmt::Display) -> ExecutionError {
    ExecutionError::Unreachable(format!("scripted executor poisoned: {err}"))
}

/// Executor returning queued outcomes per agent.
///
/// Unscripted executions succeed with `"ok"` and unscripted probes succeed
/// in one millisecond. A gated executor holds every execution until a
/// permit is granted through [`ScriptedExecutor::open_gate`].
pub struct ScriptedExecutor {
    script: Mutex<Script>,
    gate: Option<Semaphore>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Creates an executor that completes immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            gate: None,
        }
    }

    /// Creates an executor whose executions wait for [`Self::open_gate`].
    #[must_use]
    pub fn gated() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            gate: Some(Semaphore::new(0)),
        }
    }

    /// Queues the outcome of the next execution on `agent_id`.
    pub fn push_execution(&self, agent_id: &AgentId, outcome: Result<String, ExecutionError>) {
        if let Ok(mut script) = self.script.lock() {
            script
                .executions
                .entry(agent_id.clone())
                .or_default()
                .push_back(outcome);
        }
    }

    /// Queues the outcome of the next probe of `agent_id`.
    pub fn push_probe(&self, agent_id: &AgentId, outcome: Result<Duration, ExecutionError>) {
        if let Ok(mut script) = self.script.lock() {
            script
                .probes
                .entry(agent_id.clone())
                .or_default()
                .push_back(outcome);
        }
    }

    /// Lets `permits` held executions finish.
    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Returns every execution started so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ExecutionCall> {
        self.script
            .lock()
            .map(|script| script.calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        agent: &Agent,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let outcome = {
            let mut script = self.script.lock().map_err(poisoned)?;
            script.calls.push(ExecutionCall {
                agent_id: agent.id().clone(),
                task_id: task.id(),
            });
            script
                .executions
                .get_mut(agent.id())
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok("ok".to_owned()))
        };
        if let Some(gate) = &self.gate {
            tokio::select! {
                () = cancel.cancelled() => return Err(ExecutionError::Cancelled),
                permit = gate.acquire() => {
                    if let Ok(held) = permit {
                        held.forget();
                    }
                }
            }
        }
        outcome.map(|output| ExecutionOutput {
            output,
            latency: Duration::from_millis(1),
        })
    }

    async fn probe(&self, agent: &Agent, _timeout: Duration) -> Result<Duration, ExecutionError> {
        let mut script = self.script.lock().map_err(poisoned)?;
        script
            .probes
            .get_mut(agent.id())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Duration::from_millis(1)))
    }
}

#[derive(Default)]
struct SessionLog {
    opened: usize,
    closed: usize,
    commands: Vec<String>,
    responses: VecDeque<Result<CommandOutput, SessionError>>,
    open_failures: VecDeque<SessionError>,
}

/// Session connector backed by in-process fake sessions.
///
/// Unscripted commands succeed and echo the command line on stdout, which
/// makes rendered invocations observable.
#[derive(Clone, Default)]
pub struct InMemorySessionConnector {
    log: Arc<Mutex<SessionLog>>,
    open_delay: Duration,
    run_delay: Duration,
}

impl InMemorySessionConnector {
    /// Creates a connector whose sessions open and run instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every session setup by `delay`.
    #[must_use]
    pub const fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Delays every command by `delay`.
    #[must_use]
    pub const fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Makes the next session setup fail with `error`.
    pub fn fail_next_open(&self, error: SessionError) {
        if let Ok(mut log) = self.log.lock() {
            log.open_failures.push_back(error);
        }
    }

    /// Queues the result of the next command on any session.
    pub fn push_response(&self, response: Result<CommandOutput, SessionError>) {
        if let Ok(mut log) = self.log.lock() {
            log.responses.push_back(response);
        }
    }

    /// Returns how many sessions were opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.log.lock().map(|log| log.opened).unwrap_or_default()
    }

    /// Returns how many sessions were closed.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.log.lock().map(|log| log.closed).unwrap_or_default()
    }

    /// Returns every command line run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.commands.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionConnector for InMemorySessionConnector {
    async fn open(
        &self,
        _endpoint: &RemoteShellEndpoint,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let mut log = self
            .log
            .lock()
            .map_err(|err| SessionError::Unreachable(err.to_string()))?;
        if let Some(error) = log.open_failures.pop_front() {
            return Err(error);
        }
        log.opened += 1;
        Ok(Box::new(InMemorySession {
            log: Arc::clone(&self.log),
            run_delay: self.run_delay,
        }))
    }
}

struct InMemorySession {
    log: Arc<Mutex<SessionLog>>,
    run_delay: Duration,
}

#[async_trait]
impl RemoteSession for InMemorySession {
    async fn run(&self, command: &str) -> Result<CommandOutput, SessionError> {
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        let mut log = self
            .log
            .lock()
            .map_err(|err| SessionError::Broken(err.to_string()))?;
        log.commands.push(command.to_owned());
        log.responses.pop_front().unwrap_or_else(|| {
            Ok(CommandOutput {
                stdout: command.to_owned(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        })
    }

    async fn close(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.closed += 1;
        }
    }
}
