//! Registration request validation and read models.

use crate::agent::domain::{AgentDomainError, AgentEndpoint, AgentKind, SessionSetup};
use crate::coordinator::{
    AgentConnection, AgentSummary, DEFAULT_REQUEST_TIMEOUT_SECS, RegisterAgentRequest,
};
use mockable::DefaultClock;
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn http_request_builds_agent_with_defaults() {
    let agent = RegisterAgentRequest::new(
        "http-1",
        "review",
        AgentConnection::http("http://gpu-01:11434/", "llama3"),
    )
    .with_concurrency_limit(4)
    .into_agent(&DefaultClock)
    .expect("valid request");

    assert_eq!(agent.kind(), AgentKind::Http);
    assert_eq!(agent.concurrency_limit().value(), 4);
    let AgentEndpoint::Http(endpoint) = agent.endpoint() else {
        panic!("expected an HTTP endpoint");
    };
    assert_eq!(endpoint.generate_url(), "http://gpu-01:11434/api/generate");
    assert_eq!(
        endpoint.request_timeout(),
        Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
    );
}

#[rstest]
fn remote_request_carries_session_setup() {
    let connection = AgentConnection::RemoteShell {
        host: "build-01".to_owned(),
        session_setup: SessionSetup {
            user: Some("ci".to_owned()),
            port: Some(2200),
            options: vec!["StrictHostKeyChecking=no".to_owned()],
        },
        tool_invocation_template: "claude -p {{ payload }}".to_owned(),
        model: "sonnet".to_owned(),
        command_timeout_seconds: 300,
        session_timeout_seconds: 10,
    };

    let agent = RegisterAgentRequest::new("shell-1", "review", connection)
        .into_agent(&DefaultClock)
        .expect("valid request");

    let AgentEndpoint::RemoteShell(endpoint) = agent.endpoint() else {
        panic!("expected a remote shell endpoint");
    };
    assert_eq!(endpoint.session_setup().port, Some(2200));
    assert_eq!(endpoint.session_timeout(), Duration::from_secs(10));
    assert_eq!(endpoint.command_timeout(), Duration::from_secs(300));
}

#[rstest]
fn zero_limit_is_rejected() {
    let result = RegisterAgentRequest::new(
        "http-1",
        "review",
        AgentConnection::http("http://gpu-01:11434", "llama3"),
    )
    .with_concurrency_limit(0)
    .into_agent(&DefaultClock);

    assert!(matches!(result, Err(AgentDomainError::ZeroConcurrencyLimit)));
}

#[rstest]
fn blank_identifier_is_rejected() {
    let result = RegisterAgentRequest::new(
        "  ",
        "review",
        AgentConnection::http("http://gpu-01:11434", "llama3"),
    )
    .into_agent(&DefaultClock);

    assert!(matches!(result, Err(AgentDomainError::EmptyAgentId)));
}

#[rstest]
fn summary_reflects_agent() {
    let agent = RegisterAgentRequest::new(
        "http-1",
        "review",
        AgentConnection::http("http://gpu-01:11434", "llama3"),
    )
    .into_agent(&DefaultClock)
    .expect("valid request");

    let summary = AgentSummary::from(&agent);

    assert_eq!(summary.id.as_str(), "http-1");
    assert_eq!(summary.target, "http://gpu-01:11434");
    assert_eq!(summary.model, "llama3");
    assert_eq!(summary.in_flight, 0);
    assert_eq!(summary.concurrency_limit, 1);
}
