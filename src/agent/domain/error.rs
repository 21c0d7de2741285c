//! Error types for agent domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing agent domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentDomainError {
    /// The agent identifier is empty after trimming.
    #[error("agent identifier must not be empty")]
    EmptyAgentId,

    /// The agent identifier contains whitespace or exceeds 100 characters.
    #[error("agent identifier '{0}' must be at most 100 characters without whitespace")]
    InvalidAgentId(String),

    /// The capability tag is empty after trimming.
    #[error("capability tag must not be empty")]
    EmptyCapability,

    /// The concurrency limit is zero.
    #[error("concurrency limit must be a positive integer")]
    ZeroConcurrencyLimit,

    /// The HTTP endpoint is empty.
    #[error("HTTP endpoint must not be empty")]
    EmptyEndpoint,

    /// The HTTP endpoint does not start with `http://` or `https://`.
    #[error("HTTP endpoint '{0}' must start with 'http://' or 'https://'")]
    InvalidEndpoint(String),

    /// The remote host is empty.
    #[error("remote host must not be empty")]
    EmptyHost,

    /// The tool invocation template is empty.
    #[error("tool invocation template must not be empty")]
    EmptyInvocationTemplate,

    /// The model name is empty.
    #[error("model name must not be empty")]
    EmptyModel,

    /// A timeout was configured as zero seconds.
    #[error("{0} must be at least one second")]
    ZeroTimeout(&'static str),
}

/// Error returned while parsing an agent status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent status: {0}")]
pub struct ParseAgentStatusError(pub String);

/// Error returned while parsing an agent kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent kind: {0}")]
pub struct ParseAgentKindError(pub String);
