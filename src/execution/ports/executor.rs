//! Executor capability shared by every agent kind.

use crate::agent::domain::Agent;
use crate::execution::domain::{ExecutionError, ExecutionOutput};
use crate::task::domain::Task;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs tasks against one kind of agent.
///
/// Implementations never retry internally; retry policy belongs to the
/// coordinator.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes `task` on `agent`.
    ///
    /// `cancel` is fired when the task is cancelled while in flight.
    /// Executors that cannot interrupt their substrate may ignore it.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ExecutionError`].
    async fn execute(
        &self,
        agent: &Agent,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionError>;

    /// Performs a minimal no-op call bounded by `timeout`; returns its
    /// latency.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ExecutionError`].
    async fn probe(&self, agent: &Agent, timeout: Duration) -> Result<Duration, ExecutionError>;
}
