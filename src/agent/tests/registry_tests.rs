//! Unit tests for the agent registry service.

use super::fixtures::{agent_id, capability, http_agent};
use crate::agent::{
    adapters::InMemoryAgentStore,
    domain::{AgentKind, AgentStatus, HealthPolicy, HealthState},
    ports::{AgentStore, AgentStoreError, MockAgentStore},
    services::{AgentFilter, AgentRegistry, RegistryError},
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;

type TestRegistry = AgentRegistry<InMemoryAgentStore, DefaultClock>;

#[fixture]
fn store() -> Arc<InMemoryAgentStore> {
    Arc::new(InMemoryAgentStore::new())
}

fn registry_over(store: &Arc<InMemoryAgentStore>) -> TestRegistry {
    AgentRegistry::new(Arc::clone(store), Arc::new(DefaultClock))
        .with_health_policy(HealthPolicy::new(1, 1))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn register_persists_agent(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);

    let registered = registry
        .register(http_agent("worker-1", "review", 2))
        .await
        .expect("registration should succeed");

    let stored = store
        .get(registered.id())
        .await
        .expect("store read should succeed")
        .expect("agent should be persisted");
    assert_eq!(stored.id(), registered.id());
    assert_eq!(registry.get(registered.id()).expect("lookup"), registered);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_registration_is_rejected(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 2))
        .await
        .expect("first registration");

    let duplicate = registry.register(http_agent("worker-1", "docs", 1)).await;

    assert!(matches!(duplicate, Err(RegistryError::DuplicateAgent(id)) if id.as_str() == "worker-1"));
    let kept = registry.get(&agent_id("worker-1")).expect("original kept");
    assert_eq!(kept.capability().as_str(), "review");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_persist_rolls_back_registration() {
    let mut store = MockAgentStore::new();
    store.expect_put().returning(|_| {
        Err(AgentStoreError::persistence(std::io::Error::other(
            "disk full",
        )))
    });
    let registry = AgentRegistry::new(Arc::new(store), Arc::new(DefaultClock));

    let result = registry.register(http_agent("worker-1", "review", 1)).await;

    assert!(matches!(result, Err(RegistryError::Store(_))));
    assert!(matches!(
        registry.get(&agent_id("worker-1")),
        Err(RegistryError::NotFound(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregister_busy_agent_is_rejected(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 1))
        .await
        .expect("registration");
    let id = agent_id("worker-1");
    registry.reserve_slot(&id).expect("slot");

    let result = registry.unregister(&id).await;

    assert!(matches!(
        result,
        Err(RegistryError::AgentBusy { in_flight: 1, .. })
    ));
    assert!(registry.get(&id).is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregister_idle_agent_removes_record(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 1))
        .await
        .expect("registration");
    let id = agent_id("worker-1");

    registry.unregister(&id).await.expect("unregister");

    assert!(matches!(registry.get(&id), Err(RegistryError::NotFound(_))));
    assert!(store.is_empty().expect("store readable"));
    assert!(matches!(
        registry.unregister(&id).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reserve_slot_stops_at_limit(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 2))
        .await
        .expect("registration");
    let id = agent_id("worker-1");

    registry.reserve_slot(&id).expect("first slot");
    let second = registry.reserve_slot(&id).expect("second slot");
    let third = registry.reserve_slot(&id);

    assert_eq!(second.status(), AgentStatus::Busy);
    assert!(matches!(third, Err(RegistryError::AgentSaturated(_))));

    registry.release_slot(&id).expect("release");
    assert_eq!(registry.get(&id).expect("lookup").in_flight(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_reservations_never_exceed_limit(store: Arc<InMemoryAgentStore>) {
    let registry = Arc::new(registry_over(&store));
    registry
        .register(http_agent("worker-1", "review", 3))
        .await
        .expect("registration");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.reserve_slot(&agent_id("worker-1")).is_ok() })
        })
        .collect();
    let mut granted = 0;
    for handle in handles {
        if handle.await.expect("task joins") {
            granted += 1;
        }
    }

    assert_eq!(granted, 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn offline_agents_leave_capability_listing(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 1))
        .await
        .expect("registration");
    registry
        .register(http_agent("worker-2", "review", 1))
        .await
        .expect("registration");
    let id = agent_id("worker-1");

    let first = registry
        .record_failure(&id, "connection refused")
        .await
        .expect("record");
    let second = registry
        .record_failure(&id, "connection refused")
        .await
        .expect("record");

    assert_eq!(first.map(|change| change.to), Some(HealthState::Degraded));
    assert_eq!(second.map(|change| change.to), Some(HealthState::Offline));
    let listed = registry
        .list_by_capability(&capability("review"))
        .expect("listing");
    let ids: Vec<&str> = listed.iter().map(|agent| agent.id().as_str()).collect();
    assert_eq!(ids, vec!["worker-2"]);

    let persisted = store.get(&id).await.expect("read").expect("stored");
    assert_eq!(persisted.health(), HealthState::Offline);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn success_restores_offline_agent(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("worker-1", "review", 1))
        .await
        .expect("registration");
    let id = agent_id("worker-1");
    for _ in 0..2 {
        registry.record_failure(&id, "timeout").await.expect("record");
    }

    let transition = registry
        .record_success(&id, Duration::from_millis(15))
        .await
        .expect("record");

    assert_eq!(transition.map(|change| change.to), Some(HealthState::Online));
    assert_eq!(registry.get(&id).expect("lookup").status(), AgentStatus::Online);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn has_alternate_ignores_excluded_and_offline(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    for id in ["worker-1", "worker-2"] {
        registry
            .register(http_agent(id, "review", 1))
            .await
            .expect("registration");
    }
    let review = capability("review");
    let excluded = [agent_id("worker-1")];

    assert!(registry.has_alternate(&review, &excluded).expect("query"));

    for _ in 0..2 {
        registry
            .record_failure(&agent_id("worker-2"), "down")
            .await
            .expect("record");
    }
    assert!(!registry.has_alternate(&review, &excluded).expect("query"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn list_applies_filter(store: Arc<InMemoryAgentStore>) {
    let registry = registry_over(&store);
    registry
        .register(http_agent("b-worker", "review", 1))
        .await
        .expect("registration");
    registry
        .register(http_agent("a-worker", "review", 1))
        .await
        .expect("registration");
    registry
        .register(http_agent("docs-worker", "docs", 1))
        .await
        .expect("registration");
    registry.reserve_slot(&agent_id("b-worker")).expect("slot");

    let everything = registry.list(&AgentFilter::default()).expect("list");
    let busy = registry
        .list(&AgentFilter {
            status: Some(AgentStatus::Busy),
            ..AgentFilter::default()
        })
        .expect("list");
    let review_http = registry
        .list(&AgentFilter {
            capability: Some(capability("review")),
            kind: Some(AgentKind::Http),
            status: None,
        })
        .expect("list");

    let names = |agents: &[crate::agent::domain::Agent]| -> Vec<String> {
        agents.iter().map(|agent| agent.id().to_string()).collect()
    };
    assert_eq!(names(&everything), vec!["a-worker", "b-worker", "docs-worker"]);
    assert_eq!(names(&busy), vec!["b-worker"]);
    assert_eq!(names(&review_http), vec!["a-worker", "b-worker"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn load_restores_agents_with_free_slots(store: Arc<InMemoryAgentStore>) {
    let first = registry_over(&store);
    first
        .register(http_agent("worker-1", "review", 1))
        .await
        .expect("registration");
    first.reserve_slot(&agent_id("worker-1")).expect("slot");

    let second = registry_over(&store);
    let loaded = second.load().await.expect("load");

    assert_eq!(loaded, 1);
    assert_eq!(second.get(&agent_id("worker-1")).expect("lookup").in_flight(), 0);
}
