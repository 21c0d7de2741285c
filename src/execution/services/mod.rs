//! Executor routing by agent kind.

use crate::agent::domain::AgentKind;
use crate::execution::ports::Executor;
use std::sync::Arc;

/// One executor per agent kind.
///
/// This is the only place an agent kind is mapped to an executor; callers
/// hold an [`Executor`] and never branch on the kind themselves.
#[derive(Clone)]
pub struct ExecutorSet {
    http: Arc<dyn Executor>,
    remote_shell: Arc<dyn Executor>,
}

impl ExecutorSet {
    /// Creates a set from one executor per kind.
    #[must_use]
    pub const fn new(http: Arc<dyn Executor>, remote_shell: Arc<dyn Executor>) -> Self {
        Self { http, remote_shell }
    }

    /// Creates a set that routes every kind to `executor`.
    #[must_use]
    pub fn uniform(executor: Arc<dyn Executor>) -> Self {
        Self {
            http: Arc::clone(&executor),
            remote_shell: executor,
        }
    }

    /// Returns the executor for `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: AgentKind) -> Arc<dyn Executor> {
        match kind {
            AgentKind::Http => Arc::clone(&self.http),
            AgentKind::RemoteShell => Arc::clone(&self.remote_shell),
        }
    }
}
