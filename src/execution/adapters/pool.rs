//! Per-agent pool of reusable remote shell sessions.
//!
//! The pool is an arena: each agent owns a list of sessions to its host in
//! `idle` or `leased` state plus a count of sessions being opened. Keying by
//! agent keeps the session cap equal to the agent's concurrency limit, so a
//! slot reserved in the registry always has room in the pool even when
//! several agents share one host. A [`SessionLease`]
//! is a plain value naming one arena slot. Leases are returned explicitly
//! through [`SessionPool::release`], [`SessionPool::release_after_failure`]
//! or [`SessionPool::discard`]; a lease that is never returned is reclaimed
//! by [`SessionPool::reclaim_expired`] once it outlives the maximum lease
//! age.
//!
//! Each entry has its own async mutex; the map lock is held only to look up
//! or insert an entry, so a slow host never blocks another. A caller that
//! finds its entry full may wait, up to a bound, for a session to be freed.

use crate::agent::domain::{AgentId, RemoteShellEndpoint};
use crate::execution::{
    domain::{ExecutionError, TimeoutPhase},
    ports::{CommandOutput, RemoteSession, SessionConnector, SessionError},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consecutive failed commands after which a session is destroyed.
pub const MAX_SESSION_FAILURES: u32 = 3;

/// Arena identifier of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseState {
    Idle,
    Leased { since: Instant },
}

struct PooledSession {
    id: SessionId,
    handle: Arc<dyn RemoteSession>,
    state: LeaseState,
    last_used: Instant,
    failure_count: u32,
}

#[derive(Default)]
struct HostPool {
    sessions: Vec<PooledSession>,
    opening: u32,
}

#[derive(Default)]
struct PoolEntry {
    state: tokio::sync::Mutex<HostPool>,
    freed: Notify,
}

impl HostPool {
    fn occupied(&self) -> u32 {
        u32::try_from(self.sessions.len())
            .unwrap_or(u32::MAX)
            .saturating_add(self.opening)
    }

    fn take(&mut self, id: SessionId) -> Option<PooledSession> {
        let position = self.sessions.iter().position(|session| session.id == id)?;
        Some(self.sessions.swap_remove(position))
    }

    fn settle(&mut self, id: SessionId, failed: bool) -> Settlement {
        let Some(session) = self.sessions.iter_mut().find(|session| session.id == id) else {
            return Settlement::Missing;
        };
        session.failure_count = if failed {
            session.failure_count.saturating_add(1)
        } else {
            0
        };
        if session.failure_count < MAX_SESSION_FAILURES {
            session.state = LeaseState::Idle;
            session.last_used = Instant::now();
            return Settlement::Idle;
        }
        self.take(id).map_or(Settlement::Missing, Settlement::Retired)
    }
}

enum Settlement {
    Idle,
    Retired(PooledSession),
    Missing,
}

/// Exclusive use of one pooled session for one command.
pub struct SessionLease {
    host: String,
    id: SessionId,
    handle: Arc<dyn RemoteSession>,
}

impl SessionLease {
    /// Returns the pool key of the leased session.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the arena identifier of the leased session.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Runs a command over the leased session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session fails.
    pub async fn run(&self, command: &str) -> Result<CommandOutput, SessionError> {
        self.handle.run(command).await
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("host", &self.host)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Point-in-time counts for one host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Sessions waiting for a command.
    pub idle: u32,
    /// Sessions owned by an in-flight command.
    pub leased: u32,
    /// Sessions currently being established.
    pub opening: u32,
}

/// Result of one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle sessions closed for staleness.
    pub evicted: usize,
    /// Leases reclaimed after exceeding the maximum lease age.
    pub reclaimed: usize,
}

/// Returns the pool key for an endpoint: `[user@]host[:port]`.
#[must_use]
pub fn host_key(endpoint: &RemoteShellEndpoint) -> String {
    let setup = endpoint.session_setup();
    let mut key = String::new();
    if let Some(user) = &setup.user {
        key.push_str(user);
        key.push('@');
    }
    key.push_str(endpoint.host());
    if let Some(port) = setup.port {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key
}

/// Returns the pool key for `owner`'s sessions: `owner/[user@]host[:port]`.
#[must_use]
pub fn pool_key(owner: &AgentId, endpoint: &RemoteShellEndpoint) -> String {
    format!("{owner}/{}", host_key(endpoint))
}

/// Pool of remote shell sessions keyed by owning agent and host.
pub struct SessionPool {
    connector: Arc<dyn SessionConnector>,
    hosts: Mutex<HashMap<String, Arc<PoolEntry>>>,
    next_id: AtomicU64,
}

impl SessionPool {
    /// Creates an empty pool that opens sessions through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            hosts: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn host_pool(&self, key: &str) -> Result<Arc<PoolEntry>, ExecutionError> {
        let mut hosts = self
            .hosts
            .lock()
            .map_err(|err| ExecutionError::Unreachable(format!("session pool poisoned: {err}")))?;
        Ok(Arc::clone(hosts.entry(key.to_owned()).or_default()))
    }

    fn existing_host_pool(&self, key: &str) -> Option<Arc<PoolEntry>> {
        let hosts = self.hosts.lock().ok()?;
        hosts.get(key).cloned()
    }

    fn all_host_pools(&self) -> Vec<(String, Arc<PoolEntry>)> {
        self.hosts
            .lock()
            .map(|hosts| {
                hosts
                    .iter()
                    .map(|(key, pool)| (key.clone(), Arc::clone(pool)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Leases a session to `endpoint` for `owner`, opening one if none is
    /// idle.
    ///
    /// `cap` bounds idle, leased, and opening sessions together for the
    /// owner. When the owner is at its cap the call waits up to `wait` for a
    /// session to be released before giving up.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::PoolExhausted`] when no session frees up
    /// within `wait`, [`ExecutionError::Timeout`] when session setup exceeds
    /// the endpoint's session timeout, or [`ExecutionError::Unreachable`]
    /// when the session cannot be established.
    pub async fn acquire(
        &self,
        owner: &AgentId,
        endpoint: &RemoteShellEndpoint,
        cap: u32,
        wait: Duration,
    ) -> Result<SessionLease, ExecutionError> {
        let key = pool_key(owner, endpoint);
        let entry = self.host_pool(&key)?;
        let deadline = Instant::now() + wait;

        loop {
            let mut freed = std::pin::pin!(entry.freed.notified());
            freed.as_mut().enable();
            {
                let mut pool = entry.state.lock().await;
                let now = Instant::now();
                if let Some(session) = pool
                    .sessions
                    .iter_mut()
                    .find(|session| session.state == LeaseState::Idle)
                {
                    session.state = LeaseState::Leased { since: now };
                    session.last_used = now;
                    debug!(pool = %key, session = %session.id, "reusing idle session");
                    return Ok(SessionLease {
                        host: key,
                        id: session.id,
                        handle: Arc::clone(&session.handle),
                    });
                }
                if pool.occupied() < cap {
                    pool.opening = pool.opening.saturating_add(1);
                    break;
                }
            }
            if tokio::time::timeout_at(deadline, freed).await.is_err() {
                return Err(ExecutionError::PoolExhausted { host: key, cap });
            }
        }

        let setup_timeout = endpoint.session_timeout();
        let opened = tokio::time::timeout(setup_timeout, self.connector.open(endpoint)).await;

        let mut pool = entry.state.lock().await;
        pool.opening = pool.opening.saturating_sub(1);
        let session = match opened {
            Err(_) => {
                entry.freed.notify_waiters();
                warn!(pool = %key, timeout_secs = setup_timeout.as_secs(), "session setup timed out");
                return Err(ExecutionError::Timeout {
                    phase: TimeoutPhase::SessionSetup,
                    after: setup_timeout,
                });
            }
            Ok(Err(SessionError::Unreachable(detail) | SessionError::Broken(detail))) => {
                entry.freed.notify_waiters();
                warn!(pool = %key, error = %detail, "session setup failed");
                return Err(ExecutionError::Unreachable(detail));
            }
            Ok(Ok(session)) => session,
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle: Arc<dyn RemoteSession> = Arc::from(session);
        let now = Instant::now();
        pool.sessions.push(PooledSession {
            id,
            handle: Arc::clone(&handle),
            state: LeaseState::Leased { since: now },
            last_used: now,
            failure_count: 0,
        });
        info!(pool = %key, session = %id, "opened remote session");
        Ok(SessionLease {
            host: key,
            id,
            handle,
        })
    }

    /// Returns a session to `idle` after a successful command.
    pub async fn release(&self, lease: SessionLease) {
        self.return_lease(lease, false).await;
    }

    /// Returns a session to `idle` after a command that exited with failure.
    ///
    /// The session is destroyed once it accumulates
    /// [`MAX_SESSION_FAILURES`] consecutive failures.
    pub async fn release_after_failure(&self, lease: SessionLease) {
        self.return_lease(lease, true).await;
    }

    async fn return_lease(&self, lease: SessionLease, failed: bool) {
        let settlement = match self.existing_host_pool(&lease.host) {
            Some(entry) => {
                let settlement = entry.state.lock().await.settle(lease.id, failed);
                entry.freed.notify_waiters();
                settlement
            }
            None => Settlement::Missing,
        };
        match settlement {
            Settlement::Idle => {}
            Settlement::Retired(session) => {
                warn!(pool = %lease.host, session = %session.id, "destroying session after repeated failures");
                session.handle.close().await;
            }
            Settlement::Missing => {
                debug!(pool = %lease.host, session = %lease.id, "late release of reclaimed session");
                lease.handle.close().await;
            }
        }
    }

    /// Destroys the leased session; it will not be reused.
    pub async fn discard(&self, lease: SessionLease) {
        if let Some(entry) = self.existing_host_pool(&lease.host) {
            entry.state.lock().await.take(lease.id);
            entry.freed.notify_waiters();
        }
        debug!(pool = %lease.host, session = %lease.id, "discarding session");
        lease.handle.close().await;
    }

    /// Closes idle sessions unused for longer than `stale_after`.
    pub async fn evict_idle(&self, stale_after: Duration) -> usize {
        self.remove_where(|session, now| {
            session.state == LeaseState::Idle
                && now.saturating_duration_since(session.last_used) > stale_after
        })
        .await
    }

    /// Reclaims sessions leased for longer than `max_lease`.
    ///
    /// A reclaimed session is closed and its slot freed; a late release of
    /// its lease only closes the handle again.
    pub async fn reclaim_expired(&self, max_lease: Duration) -> usize {
        self.remove_where(|session, now| match session.state {
            LeaseState::Leased { since } => now.saturating_duration_since(since) > max_lease,
            LeaseState::Idle => false,
        })
        .await
    }

    /// Runs one eviction and reclamation pass.
    pub async fn sweep(&self, stale_after: Duration, max_lease: Duration) -> SweepReport {
        SweepReport {
            evicted: self.evict_idle(stale_after).await,
            reclaimed: self.reclaim_expired(max_lease).await,
        }
    }

    async fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&PooledSession, Instant) -> bool,
    {
        let mut removed = Vec::new();
        for (host, entry) in self.all_host_pools() {
            let mut pool = entry.state.lock().await;
            let now = Instant::now();
            let (expired, kept): (Vec<_>, Vec<_>) = pool
                .sessions
                .drain(..)
                .partition(|session| predicate(session, now));
            pool.sessions = kept;
            drop(pool);
            if !expired.is_empty() {
                entry.freed.notify_waiters();
            }
            removed.extend(expired.into_iter().map(|session| (host.clone(), session)));
        }
        let count = removed.len();
        for (host, session) in removed {
            info!(host = %host, session = %session.id, "closing pooled session");
            session.handle.close().await;
        }
        count
    }

    /// Returns session counts for `owner`'s sessions to `endpoint`.
    pub async fn host_stats(&self, owner: &AgentId, endpoint: &RemoteShellEndpoint) -> HostStats {
        let Some(entry) = self.existing_host_pool(&pool_key(owner, endpoint)) else {
            return HostStats::default();
        };
        let pool = entry.state.lock().await;
        let leased = pool
            .sessions
            .iter()
            .filter(|session| matches!(session.state, LeaseState::Leased { .. }))
            .count();
        let total = pool.sessions.len();
        HostStats {
            idle: u32::try_from(total - leased).unwrap_or(u32::MAX),
            leased: u32::try_from(leased).unwrap_or(u32::MAX),
            opening: pool.opening,
        }
    }

    /// Sweeps every `interval` until `shutdown` fires, then closes every
    /// remaining session.
    pub async fn run_maintenance(
        &self,
        interval: Duration,
        stale_after: Duration,
        max_lease: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep(stale_after, max_lease).await;
                    if report.evicted > 0 || report.reclaimed > 0 {
                        info!(evicted = report.evicted, reclaimed = report.reclaimed, "session pool sweep");
                    }
                }
            }
        }
        let closed = self.remove_where(|_, _| true).await;
        info!(closed, "session pool shut down");
    }
}
