//! Armada: coordination core for fleets of AI agents.
//!
//! Armada accepts tasks tagged with a capability and a priority, picks a
//! suitable agent for each, and runs the task on that agent. Agents are
//! either HTTP model servers or command-line tools reached over a pooled
//! remote shell. Agent health is probed in the background and feeds back
//! into selection.
//!
//! # Architecture
//!
//! Armada follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (HTTP, OpenSSH, memory)
//!
//! # Modules
//!
//! - [`agent`]: Agent records, the registry, and load-aware selection
//! - [`task`]: Task lifecycle and the priority queue
//! - [`execution`]: Executors and the remote session pool
//! - [`health`]: Periodic liveness probing
//! - [`coordinator`]: Dispatch loop, retries, and the public operations
//! - [`config`]: TOML configuration for the binary
//! - [`telemetry`]: Structured logging setup

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod execution;
pub mod health;
pub mod shell;
pub mod task;
pub mod telemetry;
