//! Execution outcomes and the failure taxonomy shared by every executor.

mod error;

pub use error::{ExecutionError, TimeoutPhase};

use std::time::Duration;

/// Output of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Result text: the HTTP response body or the command's standard output.
    pub output: String,
    /// Wall-clock time spent in the executor.
    pub latency: Duration,
}
