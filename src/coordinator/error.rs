//! Coordinator error type.

use crate::agent::{domain::AgentDomainError, services::RegistryError};
use crate::task::{domain::TaskDomainError, services::QueueError};
use thiserror::Error;

/// Errors returned by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Agent registration input failed validation.
    #[error(transparent)]
    AgentDomain(#[from] AgentDomainError),

    /// Task submission input failed validation.
    #[error(transparent)]
    TaskDomain(#[from] TaskDomainError),

    /// The agent registry rejected the operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The task queue rejected the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
