//! Agent connection descriptors.

use super::{AgentDomainError, ParseAgentKindError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default path for generation requests on an HTTP model server.
pub const DEFAULT_GENERATE_PATH: &str = "/api/generate";

/// Default path for lightweight status probes on an HTTP model server.
pub const DEFAULT_STATUS_PATH: &str = "/api/tags";

/// Execution substrate of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Reached over an HTTP model-serving API.
    Http,
    /// Reached by running a command-line tool over a remote shell session.
    RemoteShell,
}

impl AgentKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::RemoteShell => "remote_shell",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentKind {
    type Error = ParseAgentKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "http" => Ok(Self::Http),
            "remote_shell" => Ok(Self::RemoteShell),
            _ => Err(ParseAgentKindError(value.to_owned())),
        }
    }
}

fn non_zero_seconds(value: u64, field: &'static str) -> Result<u64, AgentDomainError> {
    if value == 0 {
        return Err(AgentDomainError::ZeroTimeout(field));
    }
    Ok(value)
}

fn non_empty(value: impl Into<String>, error: AgentDomainError) -> Result<String, AgentDomainError> {
    let normalized = value.into().trim().to_owned();
    if normalized.is_empty() {
        return Err(error);
    }
    Ok(normalized)
}

/// Connection settings for an agent behind an HTTP model server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEndpoint {
    base_url: String,
    model: String,
    request_timeout_secs: u64,
    generate_path: String,
    status_path: String,
}

impl HttpEndpoint {
    /// Creates validated HTTP connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError`] when the URL is empty or lacks an
    /// `http(s)://` prefix, the model is blank, or the timeout is zero.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        request_timeout_secs: u64,
    ) -> Result<Self, AgentDomainError> {
        let normalized_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if normalized_url.is_empty() {
            return Err(AgentDomainError::EmptyEndpoint);
        }
        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(AgentDomainError::InvalidEndpoint(normalized_url));
        }

        Ok(Self {
            base_url: normalized_url,
            model: non_empty(model, AgentDomainError::EmptyModel)?,
            request_timeout_secs: non_zero_seconds(request_timeout_secs, "request timeout")?,
            generate_path: DEFAULT_GENERATE_PATH.to_owned(),
            status_path: DEFAULT_STATUS_PATH.to_owned(),
        })
    }

    /// Overrides the generation and status paths.
    #[must_use]
    pub fn with_paths(mut self, generate_path: impl Into<String>, status_path: impl Into<String>) -> Self {
        self.generate_path = normalize_path(generate_path.into());
        self.status_path = normalize_path(status_path.into());
        self
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the full URL for generation requests.
    #[must_use]
    pub fn generate_url(&self) -> String {
        format!("{}{}", self.base_url, self.generate_path)
    }

    /// Returns the full URL for status probes.
    #[must_use]
    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url, self.status_path)
    }
}

fn normalize_path(path: String) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Parameters used to establish a remote shell session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionSetup {
    /// Login user; the SSH client default applies when absent.
    #[serde(default)]
    pub user: Option<String>,
    /// Remote port; the SSH client default applies when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Extra `-o` options passed when opening the session.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Connection settings for an agent reached through a remote shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteShellEndpoint {
    host: String,
    session_setup: SessionSetup,
    invocation_template: String,
    model: String,
    command_timeout_secs: u64,
    session_timeout_secs: u64,
}

/// Parameter object for [`RemoteShellEndpoint::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteShellParams {
    /// Remote host name or address.
    pub host: String,
    /// Session-setup parameters.
    pub session_setup: SessionSetup,
    /// Tool invocation template.
    pub invocation_template: String,
    /// Model name substituted into the template.
    pub model: String,
    /// Bound on the invoked tool's runtime, in seconds.
    pub command_timeout_secs: u64,
    /// Bound on establishing a new session, in seconds.
    pub session_timeout_secs: u64,
}

impl RemoteShellEndpoint {
    /// Creates validated remote-shell connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDomainError`] when the host, template, or model is
    /// blank, or either timeout is zero.
    pub fn new(params: RemoteShellParams) -> Result<Self, AgentDomainError> {
        Ok(Self {
            host: non_empty(params.host, AgentDomainError::EmptyHost)?,
            session_setup: params.session_setup,
            invocation_template: non_empty(
                params.invocation_template,
                AgentDomainError::EmptyInvocationTemplate,
            )?,
            model: non_empty(params.model, AgentDomainError::EmptyModel)?,
            command_timeout_secs: non_zero_seconds(params.command_timeout_secs, "command timeout")?,
            session_timeout_secs: non_zero_seconds(params.session_timeout_secs, "session timeout")?,
        })
    }

    /// Returns the remote host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the session-setup parameters.
    #[must_use]
    pub const fn session_setup(&self) -> &SessionSetup {
        &self.session_setup
    }

    /// Returns the tool invocation template.
    #[must_use]
    pub fn invocation_template(&self) -> &str {
        &self.invocation_template
    }

    /// Returns the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the bound on the invoked tool's runtime.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Returns the bound on establishing a new session.
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Connection descriptor variants, one per [`AgentKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum AgentEndpoint {
    /// HTTP model server.
    Http(HttpEndpoint),
    /// Remote shell tool invocation.
    RemoteShell(RemoteShellEndpoint),
}

impl AgentEndpoint {
    /// Returns the agent kind implied by this descriptor.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        match self {
            Self::Http(_) => AgentKind::Http,
            Self::RemoteShell(_) => AgentKind::RemoteShell,
        }
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::Http(endpoint) => endpoint.model(),
            Self::RemoteShell(endpoint) => endpoint.model(),
        }
    }

    /// Returns a short human-readable target (URL or host).
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Http(endpoint) => endpoint.base_url(),
            Self::RemoteShell(endpoint) => endpoint.host(),
        }
    }
}
