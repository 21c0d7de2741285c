//! Coordinator process: loads configuration, registers the configured
//! agents, and runs dispatch, health probing, and session-pool maintenance
//! until interrupted.
//!
//! Usage: `armada [CONFIG]`. The path falls back to `$ARMADA_CONFIG`; with
//! neither set the built-in defaults apply and no agents are registered.

use armada::agent::adapters::InMemoryAgentStore;
use armada::agent::services::AgentRegistry;
use armada::config::{ArmadaConfig, CONFIG_ENV};
use armada::coordinator::Coordinator;
use armada::execution::adapters::{HttpExecutor, OpenSshConnector, RemoteExecutor, SessionPool};
use armada::execution::services::ExecutorSet;
use armada::telemetry;
use mockable::DefaultClock;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type BoxError = Box<dyn Error + Send + Sync>;

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn load_config() -> Result<ArmadaConfig, BoxError> {
    match config_path() {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Ok(ArmadaConfig::load(path)?)
        }
        None => {
            warn!("no configuration given; running with defaults and no agents");
            Ok(ArmadaConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    telemetry::init()?;
    let config = load_config()?;

    let clock = Arc::new(DefaultClock);
    let registry = Arc::new(
        AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), Arc::clone(&clock))
            .with_health_policy(config.health_policy()),
    );

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.http.connect_timeout_seconds))
        .build()?;
    let connector = OpenSshConnector::new(config.ssh.program.clone(), config.ssh.control_dir.clone());
    let pool = Arc::new(SessionPool::new(Arc::new(connector)));
    let executors = ExecutorSet::new(
        Arc::new(HttpExecutor::new(client)),
        Arc::new(RemoteExecutor::new(Arc::clone(&pool)).with_probe_command(config.ssh.probe_command.clone())),
    );

    let coordinator = Arc::new(
        Coordinator::new(registry, executors, clock)
            .with_settings(config.dispatch_settings())
            .with_probe_settings(config.probe_interval(), config.probe_timeout()),
    );
    for request in config.registration_requests() {
        let id = request.id().to_owned();
        if let Err(err) = coordinator.register_agent(request).await {
            error!(agent_id = %id, error = %err, "agent registration failed");
        }
    }

    let shutdown = CancellationToken::new();
    let dispatcher = tokio::spawn(Arc::clone(&coordinator).run(shutdown.clone()));
    let prober = {
        let monitored = Arc::clone(&coordinator);
        let stop = shutdown.clone();
        tokio::spawn(async move { monitored.health_monitor().run(stop).await })
    };
    let maintenance = {
        let swept = Arc::clone(&pool);
        let stop = shutdown.clone();
        let interval = Duration::from_secs(config.pool.sweep_interval_seconds);
        let idle = Duration::from_secs(config.pool.idle_timeout_seconds);
        let max_lease = Duration::from_secs(config.pool.max_lease_seconds);
        tokio::spawn(async move { swept.run_maintenance(interval, idle, max_lease, stop).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    shutdown.cancel();

    dispatcher.await?;
    prober.await?;
    maintenance.await?;
    Ok(())
}
