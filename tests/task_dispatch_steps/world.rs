//! Shared world state for task dispatch BDD scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use armada::agent::{adapters::InMemoryAgentStore, services::AgentRegistry};
use armada::coordinator::{Coordinator, CoordinatorResult};
use armada::execution::{adapters::ScriptedExecutor, services::ExecutorSet};
use armada::task::domain::TaskId;
use mockable::DefaultClock;
use rstest::fixture;

/// Coordinator type used by the BDD world.
pub type TestCoordinator = Coordinator<InMemoryAgentStore, DefaultClock>;

/// Scenario world for dispatch behaviour tests.
pub struct DispatchWorld {
    /// The coordinator under test.
    pub coordinator: Arc<TestCoordinator>,
    /// Gated executor; each finished task needs one permit.
    pub executor: Arc<ScriptedExecutor>,
    /// Submitted tasks by scenario label.
    pub tasks: HashMap<String, TaskId>,
    /// Result of the last cancel request.
    pub last_cancel_result: Option<CoordinatorResult<()>>,
}

impl DispatchWorld {
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
            tasks: HashMap::new(),
            last_cancel_result: None,
        }
    }

    /// Looks up a submitted task by label.
    pub fn task(&self, label: &str) -> Result<TaskId, eyre::Report> {
        self.tasks
            .get(label)
            .copied()
            .ok_or_else(|| eyre::eyre!("no task labelled '{label}' in scenario world"))
    }
}

impl Default for DispatchWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> DispatchWorld {
    DispatchWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
