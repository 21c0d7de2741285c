//! Coordinator: the root service tying queue, registry, executors, and
//! health monitoring together.
//!
//! The coordinator owns the task queue and the dispatch loop. Each pass pulls
//! the best ready task per capability, reserves a slot on the best-ranked
//! agent, and hands the pair to the executor for that agent's kind on its own
//! tokio task. Execution outcomes flow back through the retry policy.

pub mod error;
pub mod requests;
pub mod retry;
pub mod service;

pub use error::{CoordinatorError, CoordinatorResult};
pub use requests::{
    AgentConnection, AgentSummary, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SESSION_TIMEOUT_SECS, RegisterAgentRequest, TaskView,
};
pub use retry::{DEFAULT_MAX_RETRIES, RetryDecision, RetryPolicy};
pub use service::{Coordinator, DispatchSettings};

#[cfg(test)]
mod tests;
