//! Given steps for task dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use armada::agent::domain::AgentId;
use armada::coordinator::{AgentConnection, RegisterAgentRequest};
use armada::execution::domain::ExecutionError;
use eyre::WrapErr;
use rstest_bdd_macros::given;
use serde_json::json;

#[given(r#"an online HTTP agent "{id}" with capability "{capability}" and limit {limit:u32}"#)]
fn an_online_agent(
    world: &mut DispatchWorld,
    id: String,
    capability: String,
    limit: u32,
) -> Result<(), eyre::Report> {
    let request = RegisterAgentRequest::new(
        id,
        capability,
        AgentConnection::http("http://127.0.0.1:11434", "llama3"),
    )
    .with_concurrency_limit(limit);
    run_async(world.coordinator.register_agent(request)).wrap_err("register agent for scenario")?;
    Ok(())
}

#[given(r#"agent "{id}" will be unreachable"#)]
fn agent_will_be_unreachable(world: &mut DispatchWorld, id: String) -> Result<(), eyre::Report> {
    world.executor.push_execution(
        &AgentId::new(id)?,
        Err(ExecutionError::Unreachable("connection refused".to_owned())),
    );
    Ok(())
}

#[given(r#"a task "{label}" for capability "{capability}" with priority {priority:u8}"#)]
fn a_task(
    world: &mut DispatchWorld,
    label: String,
    capability: String,
    priority: u8,
) -> Result<(), eyre::Report> {
    let task_id = world
        .coordinator
        .submit_task(capability, priority, json!({ "label": label }))
        .wrap_err("submit task for scenario")?;
    world.tasks.insert(label, task_id);
    Ok(())
}
