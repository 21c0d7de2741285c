//! OpenSSH session adapter.
//!
//! A session is an OpenSSH control master: `open` starts a backgrounded
//! master connection bound to a private control socket, `run` multiplexes
//! one command over it, and `close` asks the master to exit. The endpoint's
//! port and `-o` options are passed to every client invocation, not only
//! the master. Every child
//! process is killed when its future is dropped, so a timed-out setup or
//! command never leaves a local client behind.

use crate::agent::domain::{RemoteShellEndpoint, SessionSetup};
use crate::execution::ports::{CommandOutput, RemoteSession, SessionConnector, SessionError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Exit status the OpenSSH client uses for its own errors.
const SSH_ERROR_STATUS: i32 = 255;

/// Opens control-master sessions with the system `ssh` client.
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    program: String,
    control_dir: PathBuf,
}

impl OpenSshConnector {
    /// Creates a connector running `program` with control sockets in
    /// `control_dir`.
    #[must_use]
    pub fn new(program: impl Into<String>, control_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            control_dir: control_dir.into(),
        }
    }

    fn socket_path(&self) -> PathBuf {
        let token = Uuid::new_v4().simple().to_string();
        let short: String = token.chars().take(12).collect();
        self.control_dir.join(format!("armada-{short}.sock"))
    }
}

fn destination(endpoint: &RemoteShellEndpoint) -> String {
    endpoint.session_setup().user.as_ref().map_or_else(
        || endpoint.host().to_owned(),
        |user| format!("{user}@{}", endpoint.host()),
    )
}

/// Returns the client arguments derived from the session setup.
fn connection_args(setup: &SessionSetup) -> Vec<String> {
    let mut args = Vec::with_capacity(setup.options.len().saturating_mul(2).saturating_add(2));
    if let Some(port) = setup.port {
        args.push("-p".to_owned());
        args.push(port.to_string());
    }
    for option in &setup.options {
        args.push("-o".to_owned());
        args.push(option.clone());
    }
    args
}

fn stderr_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

#[async_trait]
impl SessionConnector for OpenSshConnector {
    async fn open(
        &self,
        endpoint: &RemoteShellEndpoint,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let socket = self.socket_path();
        let target = destination(endpoint);
        let connection = connection_args(endpoint.session_setup());
        let mut command = Command::new(&self.program);
        command
            .arg("-M")
            .arg("-S")
            .arg(&socket)
            .args(["-o", "ControlPersist=yes", "-o", "BatchMode=yes"])
            .args(&connection)
            .args(["-f", "-N"])
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(destination = %target, socket = %socket.display(), "opening ssh control master");
        let output = command
            .output()
            .await
            .map_err(|err| SessionError::Unreachable(format!("failed to run {}: {err}", self.program)))?;
        if !output.status.success() {
            return Err(SessionError::Unreachable(stderr_text(&output.stderr)));
        }
        Ok(Box::new(OpenSshSession {
            program: self.program.clone(),
            socket,
            target,
            connection,
        }))
    }
}

/// One control-master session.
#[derive(Debug)]
pub struct OpenSshSession {
    program: String,
    socket: PathBuf,
    target: String,
    connection: Vec<String>,
}

impl OpenSshSession {
    /// Returns the control socket path.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let output = Command::new(&self.program)
            .arg("-S")
            .arg(&self.socket)
            .args(["-o", "BatchMode=yes"])
            .args(&self.connection)
            .arg(&self.target)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| SessionError::Broken(format!("failed to run {}: {err}", self.program)))?;

        let exit_code = output.status.code();
        if exit_code == Some(SSH_ERROR_STATUS) {
            return Err(SessionError::Broken(stderr_text(&output.stderr)));
        }
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }

    async fn close(&self) {
        let result = Command::new(&self.program)
            .arg("-S")
            .arg(&self.socket)
            .args(["-O", "exit"])
            .args(&self.connection)
            .arg(&self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        if let Err(err) = result {
            warn!(destination = %self.target, error = %err, "failed to stop ssh control master");
        }
    }
}
