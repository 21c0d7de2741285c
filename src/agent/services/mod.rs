//! Application services for agent registration and selection.

pub mod registry;
pub mod selector;

pub use registry::{
    AgentFilter, AgentRegistry, DEFAULT_LATENCY_SMOOTHING, RegistryError, RegistryResult,
};
pub use selector::{AgentSelector, SelectionError, rank};
