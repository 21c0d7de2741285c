//! Unit tests for the remote shell executor.

use super::fixtures::{http_agent_at, remote_agent, remote_endpoint, review_task};
use crate::agent::domain::{Agent, AgentEndpoint, RemoteShellEndpoint};
use crate::execution::{
    adapters::{HostStats, InMemorySessionConnector, RemoteExecutor, SessionPool},
    domain::{ExecutionError, TimeoutPhase},
    ports::{CommandOutput, Executor, SessionError},
};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn agent_endpoint(agent: &Agent) -> &RemoteShellEndpoint {
    match agent.endpoint() {
        AgentEndpoint::RemoteShell(endpoint) => endpoint,
        AgentEndpoint::Http(_) => panic!("expected a remote shell agent"),
    }
}

fn executor_over(connector: &InMemorySessionConnector) -> RemoteExecutor {
    RemoteExecutor::new(Arc::new(SessionPool::new(Arc::new(connector.clone()))))
}

#[rstest]
#[tokio::test]
async fn execute_runs_rendered_invocation() {
    let connector = InMemorySessionConnector::new();
    let executor = executor_over(&connector);
    let agent = remote_agent(
        "shell-1",
        remote_endpoint("build-01", "claude -p {{ payload }} --model {{ model }}"),
        1,
    );
    let task = review_task(json!("summarise it's diff"));

    let output = executor
        .execute(&agent, &task, CancellationToken::new())
        .await
        .expect("execution should succeed");

    let expected = "claude -p 'summarise it'\\''s diff' --model 'sonnet'";
    assert_eq!(output.output, expected);
    assert_eq!(connector.commands(), vec![expected.to_owned()]);
    assert_eq!(
        executor.pool().host_stats(agent.id(), agent_endpoint(&agent)).await,
        HostStats { idle: 1, leased: 0, opening: 0 }
    );
}

#[rstest]
#[tokio::test]
async fn non_zero_exit_is_a_remote_error() {
    let connector = InMemorySessionConnector::new();
    connector.push_response(Ok(CommandOutput {
        stdout: String::new(),
        stderr: "model not found\n".to_owned(),
        exit_code: Some(2),
    }));
    let executor = executor_over(&connector);
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool {{ payload }}"), 1);

    let result = executor
        .execute(&agent, &review_task(json!("x")), CancellationToken::new())
        .await;

    assert_eq!(
        result.map(|output| output.output),
        Err(ExecutionError::RemoteError("exit status 2: model not found".to_owned()))
    );
    assert_eq!(connector.closed(), 0, "a failed command keeps its session");
}

#[rstest]
#[tokio::test]
async fn broken_session_is_unreachable_and_discarded() {
    let connector = InMemorySessionConnector::new();
    connector.push_response(Err(SessionError::Broken("connection reset".to_owned())));
    let executor = executor_over(&connector);
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool"), 1);

    let result = executor
        .execute(&agent, &review_task(json!("x")), CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ExecutionError::Unreachable(ref detail)) if detail == "connection reset"));
    assert_eq!(connector.closed(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_command_times_out_and_discards_session() {
    let connector = InMemorySessionConnector::new().with_run_delay(Duration::from_secs(10));
    let executor = executor_over(&connector);
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool"), 1);

    let result = executor
        .execute(&agent, &review_task(json!("x")), CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ExecutionError::Timeout { phase: TimeoutPhase::Command, after }) if after == Duration::from_secs(5)
    ));
    assert_eq!(connector.closed(), 1);
    assert_eq!(
        executor.pool().host_stats(agent.id(), agent_endpoint(&agent)).await,
        HostStats::default()
    );
}

#[rstest]
#[tokio::test]
async fn bad_template_fails_before_leasing() {
    let connector = InMemorySessionConnector::new();
    let executor = executor_over(&connector);
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool {{ payload"), 1);

    let result = executor
        .execute(&agent, &review_task(json!("x")), CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ExecutionError::RemoteError(_))));
    assert_eq!(connector.opened(), 0);
}

#[rstest]
#[tokio::test]
async fn http_agent_is_rejected() {
    let connector = InMemorySessionConnector::new();
    let executor = executor_over(&connector);
    let agent = http_agent_at("http-1", "http://127.0.0.1:9", 1);

    let result = executor
        .execute(&agent, &review_task(json!("x")), CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ExecutionError::RemoteError(_))));
}

#[rstest]
#[tokio::test]
async fn probe_runs_probe_command() {
    let connector = InMemorySessionConnector::new();
    let executor = executor_over(&connector).with_probe_command("echo ready");
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool"), 1);

    let latency = executor.probe(&agent, Duration::from_secs(2)).await;

    assert!(latency.is_ok());
    assert_eq!(connector.commands(), vec!["echo ready".to_owned()]);
}

#[rstest]
#[tokio::test]
async fn probe_reports_exhausted_pool() {
    let connector = InMemorySessionConnector::new();
    let executor = executor_over(&connector);
    let agent = remote_agent("shell-1", remote_endpoint("build-01", "tool"), 1);
    let _held = executor
        .pool()
        .acquire(agent.id(), agent_endpoint(&agent), 1, Duration::ZERO)
        .await
        .expect("lease");

    let result = executor.probe(&agent, Duration::from_secs(2)).await;

    assert!(matches!(result, Err(ExecutionError::PoolExhausted { .. })));
}
