//! Domain model for agent registration, load, and health.
//!
//! Agents are workers reached either over an HTTP model server or through a
//! command-line tool on a remote shell. The domain tracks their capability,
//! concurrency slots, and health without touching any transport.

mod agent;
mod endpoint;
mod error;
mod health;
mod ids;
mod status;

pub use agent::Agent;
pub use endpoint::{
    AgentEndpoint, AgentKind, DEFAULT_GENERATE_PATH, DEFAULT_STATUS_PATH, HttpEndpoint,
    RemoteShellEndpoint, RemoteShellParams, SessionSetup,
};
pub use error::{AgentDomainError, ParseAgentKindError, ParseAgentStatusError};
pub use health::{HealthPolicy, HealthState, HealthTransition};
pub use ids::{AgentId, CapabilityTag, ConcurrencyLimit};
pub use status::AgentStatus;
