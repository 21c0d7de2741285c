//! Persistence port for agent records.
//!
//! Storage schema lives outside this crate; the core only needs key-value
//! access keyed by agent identifier plus a bulk load at startup.

use crate::agent::domain::{Agent, AgentId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for agent store operations.
pub type AgentStoreResult<T> = Result<T, AgentStoreError>;

/// Key-value persistence contract for agent records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Returns the record stored under `id`, if any.
    async fn get(&self, id: &AgentId) -> AgentStoreResult<Option<Agent>>;

    /// Inserts or replaces the record for `agent.id()`.
    async fn put(&self, agent: &Agent) -> AgentStoreResult<()>;

    /// Removes the record stored under `id`.
    ///
    /// Removing a missing record is not an error.
    async fn delete(&self, id: &AgentId) -> AgentStoreResult<()>;

    /// Returns every stored record.
    async fn load_all(&self) -> AgentStoreResult<Vec<Agent>>;
}

/// Errors returned by agent store implementations.
#[derive(Debug, Clone, Error)]
pub enum AgentStoreError {
    /// Stored data could not be reconstructed into domain types.
    #[error("invalid persisted data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl AgentStoreError {
    /// Wraps a data-quality or deserialization error from stored records.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
