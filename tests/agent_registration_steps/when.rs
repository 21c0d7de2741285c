//! When steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, http_request, run_async};
use armada::agent::domain::AgentId;
use rstest_bdd_macros::when;

#[when("the pending agents are registered")]
fn register_pending(world: &mut RegistrationWorld) -> Result<(), eyre::Report> {
    for request in std::mem::take(&mut world.pending) {
        run_async(world.coordinator.register_agent(request))
            .map_err(|err| eyre::eyre!("unexpected registration failure: {err}"))?;
    }
    Ok(())
}

#[when(r#"an HTTP agent "{id}" with capability "{capability}" is registered again"#)]
fn register_again(world: &mut RegistrationWorld, id: String, capability: String) {
    world.last_register_result =
        Some(run_async(world.coordinator.register_agent(http_request(&id, &capability, 1))));
}

#[when(r#"agent "{id}" is unregistered"#)]
fn unregister(world: &mut RegistrationWorld, id: String) -> Result<(), eyre::Report> {
    let agent_id = AgentId::new(id)?;
    world.last_unregister_result = Some(run_async(world.coordinator.unregister_agent(&agent_id)));
    Ok(())
}
