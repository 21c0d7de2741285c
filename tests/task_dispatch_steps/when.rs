//! When steps for task dispatch BDD scenarios.

use super::world::{DispatchWorld, run_async};
use armada::agent::domain::AgentId;
use rstest_bdd_macros::when;

#[when("a dispatch pass runs")]
fn a_dispatch_pass(world: &mut DispatchWorld) {
    world.coordinator.dispatch_pass();
}

#[when(r#"agent "{id}" finishes its task"#)]
fn agent_finishes(world: &mut DispatchWorld, id: String) -> Result<(), eyre::Report> {
    let agent = world.coordinator.registry().get(&AgentId::new(id)?)?;
    if agent.in_flight() != 1 {
        return Err(eyre::eyre!("agent {} holds {} tasks", agent.id(), agent.in_flight()));
    }
    world.executor.open_gate(1);
    run_async(world.coordinator.wait_for_executions());
    Ok(())
}

#[when("dispatch runs until the queue settles")]
fn dispatch_until_settled(world: &mut DispatchWorld) {
    world.executor.open_gate(8);
    for _ in 0..4 {
        world.coordinator.dispatch_pass();
        run_async(world.coordinator.wait_for_executions());
    }
}

#[when(r#"task "{label}" is cancelled twice"#)]
fn cancel_twice(world: &mut DispatchWorld, label: String) -> Result<(), eyre::Report> {
    let task_id = world.task(&label)?;
    world.coordinator.cancel_task(task_id)?;
    world.last_cancel_result = Some(world.coordinator.cancel_task(task_id));
    Ok(())
}
