//! Executor and session adapters.

pub mod http;
pub mod memory;
pub mod openssh;
pub mod pool;
pub mod remote;

pub use http::HttpExecutor;
pub use memory::{ExecutionCall, InMemorySessionConnector, ScriptedExecutor};
pub use openssh::{OpenSshConnector, OpenSshSession};
pub use pool::{HostStats, SessionId, SessionLease, SessionPool, SweepReport, host_key, pool_key};
pub use remote::{DEFAULT_PROBE_COMMAND, RemoteExecutor};
