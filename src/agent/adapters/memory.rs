//! In-memory agent store.
//!
//! Records are held as serialized JSON so a reload behaves like a real
//! store: runtime-only fields such as the in-flight counter come back reset.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::agent::{
    domain::{Agent, AgentId},
    ports::{AgentStore, AgentStoreError, AgentStoreResult},
};

/// Thread-safe in-memory agent store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentStore {
    records: Arc<RwLock<HashMap<AgentId, String>>>,
}

impl InMemoryAgentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`AgentStoreError::Persistence`] when the lock is poisoned.
    pub fn len(&self) -> AgentStoreResult<usize> {
        let records = self.records.read().map_err(|err| {
            AgentStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(records.len())
    }

    /// Returns whether the store holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`AgentStoreError::Persistence`] when the lock is poisoned.
    pub fn is_empty(&self) -> AgentStoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn decode(raw: &str) -> AgentStoreResult<Agent> {
    serde_json::from_str(raw).map_err(AgentStoreError::invalid_persisted_data)
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get(&self, id: &AgentId) -> AgentStoreResult<Option<Agent>> {
        let records = self.records.read().map_err(|err| {
            AgentStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        records.get(id).map(|raw| decode(raw)).transpose()
    }

    async fn put(&self, agent: &Agent) -> AgentStoreResult<()> {
        let encoded = serde_json::to_string(agent).map_err(AgentStoreError::persistence)?;
        let mut records = self.records.write().map_err(|err| {
            AgentStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        records.insert(agent.id().clone(), encoded);
        Ok(())
    }

    async fn delete(&self, id: &AgentId) -> AgentStoreResult<()> {
        let mut records = self.records.write().map_err(|err| {
            AgentStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        records.remove(id);
        Ok(())
    }

    async fn load_all(&self) -> AgentStoreResult<Vec<Agent>> {
        let records = self.records.read().map_err(|err| {
            AgentStoreError::persistence(std::io::Error::other(err.to_string()))
        })?;
        records.values().map(|raw| decode(raw)).collect()
    }
}
