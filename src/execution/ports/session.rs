//! Remote shell session contracts used by the connection pool.

use crate::agent::domain::RemoteShellEndpoint;
use async_trait::async_trait;
use thiserror::Error;

/// Output from a command run over a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code; `None` if the remote process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Session-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The host could not be reached or refused the session.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The session died; it must not be reused.
    #[error("session broken: {0}")]
    Broken(String),
}

/// Opens sessions to remote hosts.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Establishes a new session. Callers bound this with the endpoint's
    /// session-setup timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session cannot be established.
    async fn open(&self, endpoint: &RemoteShellEndpoint) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// One established session to a host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs a shell command line and captures its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`], not
    /// as an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Broken`] when the session itself fails.
    async fn run(&self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Tears the session down.
    async fn close(&self);
}
