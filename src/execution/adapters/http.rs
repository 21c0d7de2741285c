//! Executor for agents behind an HTTP model-serving API.
//!
//! Requests follow the Ollama generate shape: the task payload becomes the
//! prompt and streaming is disabled so the whole response arrives as one
//! body.

use crate::agent::domain::{Agent, AgentEndpoint, HttpEndpoint};
use crate::execution::{
    domain::{ExecutionError, ExecutionOutput, TimeoutPhase},
    ports::Executor,
};
use crate::shell::payload_text;
use crate::task::domain::Task;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest response excerpt attached to a remote error.
const MAX_ERROR_DETAIL: usize = 2048;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

/// Issues one request per task to the agent's endpoint.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Creates an executor over an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates an executor with a default client.
    ///
    /// # Errors
    ///
    /// Returns the client builder error when the TLS backend cannot be
    /// initialised.
    pub fn with_default_client() -> Result<Self, reqwest::Error> {
        Ok(Self::new(Client::builder().build()?))
    }
}

fn http_endpoint(agent: &Agent) -> Result<&HttpEndpoint, ExecutionError> {
    match agent.endpoint() {
        AgentEndpoint::Http(endpoint) => Ok(endpoint),
        AgentEndpoint::RemoteShell(_) => Err(ExecutionError::RemoteError(format!(
            "agent {} is not an HTTP agent",
            agent.id()
        ))),
    }
}

fn classify(err: &reqwest::Error, phase: TimeoutPhase, limit: Duration) -> ExecutionError {
    if err.is_timeout() {
        return ExecutionError::Timeout {
            phase,
            after: limit,
        };
    }
    ExecutionError::Unreachable(err.to_string())
}

async fn read_body(
    response: Response,
    phase: TimeoutPhase,
    limit: Duration,
) -> Result<String, ExecutionError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| classify(&err, phase, limit))?;
    if status.is_success() {
        return Ok(body);
    }
    let excerpt: String = body.trim().chars().take(MAX_ERROR_DETAIL).collect();
    Err(ExecutionError::RemoteError(format!("HTTP {status}: {excerpt}")))
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(
        &self,
        agent: &Agent,
        task: &Task,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let endpoint = http_endpoint(agent)?;
        let limit = endpoint.request_timeout();
        let body = GenerateRequest {
            model: endpoint.model(),
            prompt: payload_text(task.payload()),
            stream: false,
        };
        let started = Instant::now();
        let exchange = async {
            let response = self
                .client
                .post(endpoint.generate_url())
                .json(&body)
                .send()
                .await
                .map_err(|err| classify(&err, TimeoutPhase::Request, limit))?;
            read_body(response, TimeoutPhase::Request, limit).await
        };

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(task_id = %task.id(), agent_id = %agent.id(), "aborting HTTP request");
                return Err(ExecutionError::Cancelled);
            }
            outcome = tokio::time::timeout(limit, exchange) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ExecutionError::Timeout {
                        phase: TimeoutPhase::Request,
                        after: limit,
                    });
                }
            },
        };
        Ok(ExecutionOutput {
            output,
            latency: started.elapsed(),
        })
    }

    async fn probe(&self, agent: &Agent, timeout: Duration) -> Result<Duration, ExecutionError> {
        let endpoint = http_endpoint(agent)?;
        let started = Instant::now();
        let exchange = async {
            let response = self
                .client
                .get(endpoint.status_url())
                .send()
                .await
                .map_err(|err| classify(&err, TimeoutPhase::Probe, timeout))?;
            read_body(response, TimeoutPhase::Probe, timeout).await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ExecutionError::Timeout {
                phase: TimeoutPhase::Probe,
                after: timeout,
            })??;
        Ok(started.elapsed())
    }
}
