//! Given steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, http_request, run_async};
use armada::coordinator::{AgentConnection, RegisterAgentRequest};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use serde_json::json;

#[given(r#"an HTTP agent "{id}" with capability "{capability}" and limit {limit:u32}"#)]
fn an_http_agent(world: &mut RegistrationWorld, id: String, capability: String, limit: u32) {
    world.pending.push(http_request(&id, &capability, limit));
}

#[given(r#"a remote shell agent "{id}" on host "{host}" with capability "{capability}""#)]
fn a_remote_shell_agent(world: &mut RegistrationWorld, id: String, host: String, capability: String) {
    world.pending.push(RegisterAgentRequest::new(
        id,
        capability,
        AgentConnection::remote_shell(host, "claude -p {{ payload }}", "sonnet"),
    ));
}

#[given(r#"a registered HTTP agent "{id}" with capability "{capability}""#)]
fn a_registered_http_agent(
    world: &mut RegistrationWorld,
    id: String,
    capability: String,
) -> Result<(), eyre::Report> {
    run_async(world.coordinator.register_agent(http_request(&id, &capability, 1)))
        .wrap_err("register agent for scenario")?;
    Ok(())
}

#[given(r#"a task for capability "{capability}" is running"#)]
fn a_task_is_running(world: &mut RegistrationWorld, capability: String) -> Result<(), eyre::Report> {
    let task_id = world
        .coordinator
        .submit_task(&capability, 1, json!("hold"))
        .wrap_err("submit task for scenario")?;
    let dispatched = world.coordinator.dispatch_pass();
    if dispatched != 1 {
        return Err(eyre::eyre!("expected one dispatch, got {dispatched}"));
    }
    world.task = Some(task_id);
    Ok(())
}
