//! Adapter implementations for agent ports.

pub mod memory;

pub use memory::InMemoryAgentStore;
