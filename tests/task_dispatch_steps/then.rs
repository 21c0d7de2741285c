//! Then steps for task dispatch BDD scenarios.

use super::world::DispatchWorld;
use armada::coordinator::CoordinatorError;
use armada::task::{domain::TaskStatus, services::QueueError};
use rstest_bdd_macros::then;

fn expect_status(world: &DispatchWorld, label: &str, expected: TaskStatus) -> Result<(), eyre::Report> {
    let view = world.coordinator.get_task(world.task(label)?)?;
    if view.status != expected {
        return Err(eyre::eyre!("task '{label}' is {}, expected {expected}", view.status));
    }
    Ok(())
}

#[then(r#"task "{label}" is assigned to agent "{agent}""#)]
fn task_assigned_to(world: &DispatchWorld, label: String, agent: String) -> Result<(), eyre::Report> {
    let view = world.coordinator.get_task(world.task(&label)?)?;
    let holder = view
        .assigned_agent
        .ok_or_else(|| eyre::eyre!("task '{label}' has no agent"))?;
    if holder.as_str() != agent {
        return Err(eyre::eyre!("task '{label}' went to {holder}, expected {agent}"));
    }
    Ok(())
}

#[then(r#"task "{label}" is pending"#)]
fn task_pending(world: &DispatchWorld, label: String) -> Result<(), eyre::Report> {
    expect_status(world, &label, TaskStatus::Pending)
}

#[then(r#"task "{label}" is completed"#)]
fn task_completed(world: &DispatchWorld, label: String) -> Result<(), eyre::Report> {
    expect_status(world, &label, TaskStatus::Completed)
}

#[then(r#"task "{label}" is cancelled"#)]
fn task_cancelled(world: &DispatchWorld, label: String) -> Result<(), eyre::Report> {
    expect_status(world, &label, TaskStatus::Cancelled)
}

#[then("the second cancel reports the task already terminal")]
fn second_cancel_terminal(world: &DispatchWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_cancel_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing cancel result in scenario world"))?;
    if !matches!(
        result,
        Err(CoordinatorError::Queue(QueueError::AlreadyTerminal(_)))
    ) {
        return Err(eyre::eyre!("expected already terminal error, got {result:?}"));
    }
    Ok(())
}
