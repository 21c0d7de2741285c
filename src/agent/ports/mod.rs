//! Port contracts for agent persistence.

pub mod store;

#[cfg(test)]
pub use store::MockAgentStore;
pub use store::{AgentStore, AgentStoreError, AgentStoreResult};
