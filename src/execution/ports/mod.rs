//! Port contracts for executors and remote shell sessions.

pub mod executor;
pub mod session;

pub use executor::Executor;
pub use session::{CommandOutput, RemoteSession, SessionConnector, SessionError};
