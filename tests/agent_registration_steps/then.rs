//! Then steps for agent registration BDD scenarios.

use super::world::{RegistrationWorld, run_async};
use armada::agent::{
    domain::{AgentId, AgentStatus, CapabilityTag},
    services::{AgentFilter, RegistryError},
};
use armada::coordinator::CoordinatorError;
use armada::task::domain::TaskStatus;
use rstest_bdd_macros::then;

#[then(r#"listing agents for capability "{capability}" returns {count:usize} entries"#)]
fn listing_returns_count(
    world: &mut RegistrationWorld,
    capability: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let filter = AgentFilter {
        capability: Some(CapabilityTag::new(capability)?),
        ..AgentFilter::default()
    };
    let agents = world.coordinator.list_agents(&filter)?;
    if agents.len() != count {
        return Err(eyre::eyre!("expected {count} agents, found {}", agents.len()));
    }
    Ok(())
}

#[then(r#"agent "{id}" is online with {in_flight:u32} tasks in flight"#)]
fn agent_is_online(world: &mut RegistrationWorld, id: String, in_flight: u32) -> Result<(), eyre::Report> {
    let agent = world.coordinator.registry().get(&AgentId::new(id)?)?;
    if agent.status() != AgentStatus::Online || agent.in_flight() != in_flight {
        return Err(eyre::eyre!(
            "agent is {} with {} in flight",
            agent.status(),
            agent.in_flight()
        ));
    }
    Ok(())
}

#[then("registration fails with a duplicate agent error")]
fn duplicate_rejected(world: &RegistrationWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_register_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing registration result in scenario world"))?;
    if !matches!(
        result,
        Err(CoordinatorError::Registry(RegistryError::DuplicateAgent(_)))
    ) {
        return Err(eyre::eyre!("expected duplicate agent error, got {result:?}"));
    }
    Ok(())
}

#[then("unregistration fails because the agent is busy")]
fn busy_rejected(world: &RegistrationWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_unregister_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing unregistration result in scenario world"))?;
    if !matches!(
        result,
        Err(CoordinatorError::Registry(RegistryError::AgentBusy { in_flight: 1, .. }))
    ) {
        return Err(eyre::eyre!("expected agent busy error, got {result:?}"));
    }
    Ok(())
}

#[then(r#"agent "{id}" can be unregistered once the task finishes"#)]
fn unregister_after_finish(world: &mut RegistrationWorld, id: String) -> Result<(), eyre::Report> {
    let task_id = world
        .task
        .ok_or_else(|| eyre::eyre!("no task started in scenario world"))?;
    world.executor.open_gate(1);
    run_async(world.coordinator.wait_for_executions());
    let status = world.coordinator.get_task(task_id)?.status;
    if status != TaskStatus::Completed {
        return Err(eyre::eyre!("expected completed task, got {status}"));
    }
    run_async(world.coordinator.unregister_agent(&AgentId::new(id)?))?;
    Ok(())
}
