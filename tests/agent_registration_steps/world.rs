//! Shared world state for agent registration BDD scenarios.

use std::sync::Arc;

use armada::agent::{adapters::InMemoryAgentStore, domain::AgentId, services::AgentRegistry};
use armada::coordinator::{AgentConnection, Coordinator, CoordinatorResult, RegisterAgentRequest};
use armada::execution::{adapters::ScriptedExecutor, services::ExecutorSet};
use armada::task::domain::TaskId;
use mockable::DefaultClock;
use rstest::fixture;

/// Coordinator type used by the BDD world.
pub type TestCoordinator = Coordinator<InMemoryAgentStore, DefaultClock>;

/// Scenario world for agent registration behaviour tests.
pub struct RegistrationWorld {
    /// The coordinator under test.
    pub coordinator: Arc<TestCoordinator>,
    /// Executor holding every execution until released.
    pub executor: Arc<ScriptedExecutor>,
    /// Requests queued for registration.
    pub pending: Vec<RegisterAgentRequest>,
    /// Result of the last registration attempt.
    pub last_register_result: Option<CoordinatorResult<AgentId>>,
    /// Result of the last unregistration attempt.
    pub last_unregister_result: Option<CoordinatorResult<()>>,
    /// Task started by the scenario.
    pub task: Option<TaskId>,
}

impl RegistrationWorld {
    /// Creates a world around a coordinator with a gated executor.
    #[must_use]
    pub fn new() -> Self {
        let executor = Arc::new(ScriptedExecutor::gated());
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(DefaultClock),
        ));
        let coordinator = Coordinator::new(
            registry,
            ExecutorSet::uniform(executor.clone()),
            Arc::new(DefaultClock),
        );
        Self {
            coordinator: Arc::new(coordinator),
            executor,
            pending: Vec::new(),
            last_register_result: None,
            last_unregister_result: None,
            task: None,
        }
    }
}

impl Default for RegistrationWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RegistrationWorld {
    RegistrationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Builds a request for an HTTP agent on the local model server.
pub fn http_request(id: &str, capability: &str, limit: u32) -> RegisterAgentRequest {
    RegisterAgentRequest::new(
        id,
        capability,
        AgentConnection::http("http://127.0.0.1:11434", "llama3"),
    )
    .with_concurrency_limit(limit)
}
