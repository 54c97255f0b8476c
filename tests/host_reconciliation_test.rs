//! Host reconciliation: a MAC sighting that reappears under a new name is
//! recognized as the same host rather than spawning a duplicate row.

use std::sync::Arc;

use woly_coreplane::adapters::sqlite::{create_migrated_test_pool, SqliteHostStore};
use woly_coreplane::domain::models::host::HostStatus;
use woly_coreplane::domain::ports::HostSighting;
use woly_coreplane::services::host_aggregator::HostAggregatorEvent;
use woly_coreplane::services::HostAggregator;

async fn aggregator() -> HostAggregator {
    let pool = create_migrated_test_pool().await.unwrap();
    HostAggregator::new(Arc::new(SqliteHostStore::new(pool)))
}

fn sighting() -> HostSighting {
    HostSighting { node_id: "node-1".into(), name: "pc-a".into(), mac: "aa:bb:cc:dd:ee:ff".into(), ip: Some("10.0.0.5".into()), wol_port: None, location: "lab".into() }
}

/// Scenario: a host renamed on the OS side (new hostname, same NIC) is
/// reconciled onto its existing row by MAC, not inserted as a second host,
/// and its fully-qualified name is updated to reflect the rename.
#[tokio::test]
async fn renaming_a_host_updates_the_existing_row_instead_of_creating_a_new_one() {
    let aggregator = aggregator().await;
    let (outcome, events) = aggregator.reconcile_sighting(sighting()).await.unwrap();
    let original = outcome.into_host();
    assert_eq!(original.fully_qualified_name, "pc-a@lab-node-1");
    assert!(matches!(events.as_slice(), [HostAggregatorEvent::Discovered(_)]));

    let mut renamed = sighting();
    renamed.name = "pc-a-renamed".into();
    let (outcome, _events) = aggregator.reconcile_sighting(renamed).await.unwrap();
    let updated = outcome.into_host();

    assert_eq!(updated.id, original.id, "same MAC must reconcile onto the same row");
    assert_eq!(updated.fully_qualified_name, "pc-a-renamed@lab-node-1");

    let stats = aggregator.get_stats().await.unwrap();
    assert_eq!(stats.total_hosts, 1, "the rename must not leave a stale duplicate behind");

    let found = aggregator.find_by_fqn("pc-a@lab-node-1").await.unwrap();
    assert!(found.is_none(), "the old FQN must no longer resolve");
    let found = aggregator.find_by_fqn("pc-a-renamed@lab-node-1").await.unwrap();
    assert!(found.is_some());
}

/// Scenario: once a node disconnects, every host it owns transitions to
/// asleep exactly once, and the transition is recorded in status history so
/// `uptime_since` can account for the gap.
#[tokio::test]
async fn a_node_disconnect_sleeps_its_hosts_and_is_reflected_in_uptime() {
    let aggregator = aggregator().await;
    aggregator.reconcile_sighting(sighting()).await.unwrap();

    let since = chrono::Utc::now() - chrono::Duration::minutes(5);
    let before = aggregator.uptime_since("pc-a@lab-node-1", since).await.unwrap().unwrap();
    assert_eq!(before.current_status, HostStatus::Awake);

    let events = aggregator.mark_node_hosts_unreachable("node-1").await.unwrap();
    assert_eq!(events.len(), 1);

    let after = aggregator.uptime_since("pc-a@lab-node-1", since).await.unwrap().unwrap();
    assert_eq!(after.current_status, HostStatus::Asleep);
    assert_eq!(after.transition_count, 1);
}
