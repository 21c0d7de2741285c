//! TOML configuration for the `armada` binary.
//!
//! ```toml
//! [dispatch]
//! max_retries = 1
//!
//! [health]
//! probe_interval_seconds = 30
//!
//! [[agents]]
//! kind = "http"
//! id = "gpu-01"
//! endpoint = "http://gpu-01:11434"
//! model = "llama3"
//! capability = "review"
//! concurrency_limit = 2
//!
//! [[agents]]
//! kind = "remote_shell"
//! id = "build-01"
//! host = "build-01.internal"
//! tool_invocation_template = "claude -p {{ payload }} --model {{ model }}"
//! model = "sonnet"
//! capability = "refactor"
//! session_setup = { user = "ci", port = 22 }
//! ```
//!
//! Every section is optional. Agent keys also accept their camelCase
//! spelling (`concurrencyLimit`, `toolInvocationTemplate`, ...).

use crate::agent::domain::{
    DEFAULT_GENERATE_PATH, DEFAULT_STATUS_PATH, HealthPolicy, SessionSetup,
};
use crate::coordinator::{
    AgentConnection, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SESSION_TIMEOUT_SECS, DispatchSettings,
    RegisterAgentRequest, RetryPolicy,
};
use crate::execution::adapters::DEFAULT_PROBE_COMMAND;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "ARMADA_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two agents share an identifier.
    #[error("agent '{0}' is configured more than once")]
    DuplicateAgent(String),

    /// A setting is out of range.
    #[error("invalid setting {key}: {reason}")]
    Invalid {
        /// Dotted key of the setting.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArmadaConfig {
    /// Dispatch loop settings.
    pub dispatch: DispatchConfig,
    /// Health probing settings.
    pub health: HealthConfig,
    /// Remote session pool settings.
    pub pool: PoolConfig,
    /// OpenSSH client settings.
    pub ssh: SshConfig,
    /// HTTP client settings.
    pub http: HttpClientConfig,
    /// Agents registered at startup.
    pub agents: Vec<AgentConfig>,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Fallback interval between dispatch passes.
    pub tick_interval_seconds: u64,
    /// Retries after an unreachable or timed-out execution.
    pub max_retries: u32,
    /// How long finished tasks stay queryable.
    pub retention_seconds: u64,
    /// Interval between retention purges.
    pub maintenance_interval_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 5,
            max_retries: DEFAULT_MAX_RETRIES,
            retention_seconds: 24 * 60 * 60,
            maintenance_interval_seconds: 60,
        }
    }
}

/// `[health]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between probe rounds.
    pub probe_interval_seconds: u64,
    /// Bound on one probe.
    pub probe_timeout_seconds: u64,
    /// Consecutive failures that degrade an online agent.
    pub degrade_after: u32,
    /// Further failures that take a degraded agent offline.
    pub offline_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_seconds: 30,
            probe_timeout_seconds: 5,
            degrade_after: 3,
            offline_after: 3,
        }
    }
}

/// `[pool]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Interval between eviction and reclamation sweeps.
    pub sweep_interval_seconds: u64,
    /// Idle time after which a session is closed.
    pub idle_timeout_seconds: u64,
    /// Lease age after which a session is reclaimed.
    pub max_lease_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 30,
            idle_timeout_seconds: 300,
            max_lease_seconds: 3600,
        }
    }
}

/// `[ssh]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Client executable.
    pub program: String,
    /// Directory for control sockets.
    pub control_dir: PathBuf,
    /// Command run by health probes.
    pub probe_command: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_owned(),
            control_dir: std::env::temp_dir(),
            probe_command: DEFAULT_PROBE_COMMAND.to_owned(),
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Bound on establishing a TCP connection.
    pub connect_timeout_seconds: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
        }
    }
}

fn default_concurrency_limit() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_session_timeout() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

/// One `[[agents]]` entry, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    /// HTTP model server.
    Http {
        /// Agent identifier.
        id: String,
        /// Base URL.
        endpoint: String,
        /// Model name.
        model: String,
        /// Capability tag.
        capability: String,
        /// Concurrency limit.
        #[serde(default = "default_concurrency_limit", alias = "concurrencyLimit")]
        concurrency_limit: u32,
        /// Per-request bound.
        #[serde(default = "default_request_timeout", alias = "requestTimeoutSeconds")]
        request_timeout_seconds: u64,
        /// Generation path override.
        #[serde(default, alias = "generatePath")]
        generate_path: Option<String>,
        /// Status path override.
        #[serde(default, alias = "statusPath")]
        status_path: Option<String>,
    },
    /// Command-line tool over a remote shell.
    #[serde(alias = "remote-shell", alias = "remoteShell")]
    RemoteShell {
        /// Agent identifier.
        id: String,
        /// Remote host.
        host: String,
        /// Session-setup parameters.
        #[serde(default, alias = "sessionSetup")]
        session_setup: SessionSetup,
        /// Tool invocation template.
        #[serde(alias = "toolInvocationTemplate")]
        tool_invocation_template: String,
        /// Model name.
        model: String,
        /// Capability tag.
        capability: String,
        /// Concurrency limit; also caps sessions to the host.
        #[serde(default = "default_concurrency_limit", alias = "concurrencyLimit")]
        concurrency_limit: u32,
        /// Bound on the tool's runtime.
        #[serde(default = "default_command_timeout", alias = "commandTimeoutSeconds")]
        command_timeout_seconds: u64,
        /// Bound on session setup.
        #[serde(default = "default_session_timeout", alias = "sessionTimeoutSeconds")]
        session_timeout_seconds: u64,
    },
}

impl AgentConfig {
    /// Returns the configured identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Http { id, .. } | Self::RemoteShell { id, .. } => id,
        }
    }

    /// Converts the entry into a registration request.
    #[must_use]
    pub fn to_request(&self) -> RegisterAgentRequest {
        match self {
            Self::Http {
                id,
                endpoint,
                model,
                capability,
                concurrency_limit,
                request_timeout_seconds,
                generate_path,
                status_path,
            } => {
                let paths = match (generate_path, status_path) {
                    (None, None) => None,
                    (generate, status) => Some((
                        generate
                            .clone()
                            .unwrap_or_else(|| DEFAULT_GENERATE_PATH.to_owned()),
                        status.clone().unwrap_or_else(|| DEFAULT_STATUS_PATH.to_owned()),
                    )),
                };
                RegisterAgentRequest::new(
                    id.clone(),
                    capability.clone(),
                    AgentConnection::Http {
                        endpoint: endpoint.clone(),
                        model: model.clone(),
                        request_timeout_seconds: *request_timeout_seconds,
                        paths,
                    },
                )
                .with_concurrency_limit(*concurrency_limit)
            }
            Self::RemoteShell {
                id,
                host,
                session_setup,
                tool_invocation_template,
                model,
                capability,
                concurrency_limit,
                command_timeout_seconds,
                session_timeout_seconds,
            } => RegisterAgentRequest::new(
                id.clone(),
                capability.clone(),
                AgentConnection::RemoteShell {
                    host: host.clone(),
                    session_setup: session_setup.clone(),
                    tool_invocation_template: tool_invocation_template.clone(),
                    model: model.clone(),
                    command_timeout_seconds: *command_timeout_seconds,
                    session_timeout_seconds: *session_timeout_seconds,
                },
            )
            .with_concurrency_limit(*concurrency_limit),
        }
    }
}

const fn positive(value: u64, key: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be at least one second",
        });
    }
    Ok(())
}

impl ArmadaConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = path.as_ref();
        let content = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is not valid TOML for this
    /// schema or a setting is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive(self.dispatch.tick_interval_seconds, "dispatch.tick_interval_seconds")?;
        positive(
            self.dispatch.maintenance_interval_seconds,
            "dispatch.maintenance_interval_seconds",
        )?;
        positive(self.health.probe_interval_seconds, "health.probe_interval_seconds")?;
        positive(self.health.probe_timeout_seconds, "health.probe_timeout_seconds")?;
        positive(self.pool.sweep_interval_seconds, "pool.sweep_interval_seconds")?;
        positive(self.pool.idle_timeout_seconds, "pool.idle_timeout_seconds")?;
        positive(self.pool.max_lease_seconds, "pool.max_lease_seconds")?;
        positive(self.http.connect_timeout_seconds, "http.connect_timeout_seconds")?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id().trim()) {
                return Err(ConfigError::DuplicateAgent(agent.id().to_owned()));
            }
        }
        Ok(())
    }

    /// Returns the registration requests for every configured agent.
    #[must_use]
    pub fn registration_requests(&self) -> Vec<RegisterAgentRequest> {
        self.agents.iter().map(AgentConfig::to_request).collect()
    }

    /// Returns the dispatch loop settings.
    #[must_use]
    pub const fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            tick_interval: Duration::from_secs(self.dispatch.tick_interval_seconds),
            retry: RetryPolicy::new(self.dispatch.max_retries),
            retention: Duration::from_secs(self.dispatch.retention_seconds),
            maintenance_interval: Duration::from_secs(self.dispatch.maintenance_interval_seconds),
        }
    }

    /// Returns the health thresholds.
    #[must_use]
    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy::new(self.health.degrade_after, self.health.offline_after)
    }

    /// Returns the interval between probe rounds.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.health.probe_interval_seconds)
    }

    /// Returns the bound on one probe.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.health.probe_timeout_seconds)
    }
}
