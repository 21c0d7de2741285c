//! Unit tests for agent selection.

use super::fixtures::{agent_id, capability, http_agent};
use crate::agent::{
    adapters::InMemoryAgentStore,
    domain::HealthPolicy,
    services::{AgentRegistry, AgentSelector, SelectionError},
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;

type TestRegistry = AgentRegistry<InMemoryAgentStore, DefaultClock>;

#[fixture]
fn registry() -> Arc<TestRegistry> {
    Arc::new(
        AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), Arc::new(DefaultClock))
            .with_health_policy(HealthPolicy::new(1, 1))
            .with_latency_smoothing(1.0),
    )
}

async fn register(registry: &TestRegistry, id: &str, limit: u32) {
    registry
        .register(http_agent(id, "review", limit))
        .await
        .expect("registration should succeed");
}

fn selected(selector: &AgentSelector<InMemoryAgentStore, DefaultClock>) -> String {
    selector
        .select(&capability("review"), &[])
        .expect("an agent should be selected")
        .id()
        .to_string()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn prefers_lower_load_ratio(registry: Arc<TestRegistry>) {
    register(&registry, "alpha", 2).await;
    register(&registry, "beta", 4).await;
    registry.reserve_slot(&agent_id("alpha")).expect("slot");
    registry.reserve_slot(&agent_id("beta")).expect("slot");
    let selector = AgentSelector::new(Arc::clone(&registry));

    assert_eq!(selected(&selector), "beta");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn prefers_online_over_degraded(registry: Arc<TestRegistry>) {
    register(&registry, "alpha", 1).await;
    register(&registry, "beta", 4).await;
    registry
        .record_failure(&agent_id("alpha"), "timeout")
        .await
        .expect("record");
    for _ in 0..3 {
        registry.reserve_slot(&agent_id("beta")).expect("slot");
    }
    let selector = AgentSelector::new(Arc::clone(&registry));

    assert_eq!(selected(&selector), "beta");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lower_latency_breaks_load_ties(registry: Arc<TestRegistry>) {
    register(&registry, "alpha", 1).await;
    register(&registry, "beta", 1).await;
    register(&registry, "gamma", 1).await;
    registry
        .observe_latency(&agent_id("alpha"), Duration::from_millis(900))
        .expect("observe");
    registry
        .observe_latency(&agent_id("beta"), Duration::from_millis(120))
        .expect("observe");
    let selector = AgentSelector::new(Arc::clone(&registry));

    let ranked: Vec<String> = selector
        .candidates(&capability("review"), &[])
        .expect("candidates")
        .iter()
        .map(|agent| agent.id().to_string())
        .collect();

    assert_eq!(ranked, vec!["beta", "alpha", "gamma"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identical_agents_are_ordered_by_id(registry: Arc<TestRegistry>) {
    register(&registry, "zeta", 1).await;
    register(&registry, "eta", 1).await;
    let selector = AgentSelector::new(Arc::clone(&registry));

    assert_eq!(selected(&selector), "eta");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn saturated_offline_and_excluded_agents_are_skipped(registry: Arc<TestRegistry>) {
    register(&registry, "busy", 1).await;
    register(&registry, "down", 1).await;
    register(&registry, "excluded", 1).await;
    registry.reserve_slot(&agent_id("busy")).expect("slot");
    for _ in 0..2 {
        registry
            .record_failure(&agent_id("down"), "unreachable")
            .await
            .expect("record");
    }
    let selector = AgentSelector::new(Arc::clone(&registry));

    let result = selector.select(&capability("review"), &[agent_id("excluded")]);

    assert!(matches!(result, Err(SelectionError::NoAgentAvailable(tag)) if tag.as_str() == "review"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_capability_has_no_agent(registry: Arc<TestRegistry>) {
    register(&registry, "alpha", 1).await;
    let selector = AgentSelector::new(Arc::clone(&registry));

    assert!(matches!(
        selector.select(&capability("translate"), &[]),
        Err(SelectionError::NoAgentAvailable(_))
    ));
}
