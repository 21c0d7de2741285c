//! Task execution over HTTP model servers and remote shell sessions.
//!
//! - Outcomes and the failure taxonomy in [`domain`]
//! - The [`ports::Executor`] capability and session contracts in [`ports`]
//! - HTTP, remote shell, pool, and in-memory adapters in [`adapters`]
//! - Routing by agent kind in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
