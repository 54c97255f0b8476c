//! Aggregated-host persistence port (§4.3, §6).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::host::{AggregatedHost, HostStatus, HostStatusHistoryEntry};

/// A raw sighting reported by a node agent, before reconciliation.
#[derive(Debug, Clone)]
pub struct HostSighting {
    pub node_id: String,
    pub name: String,
    pub mac: String,
    pub ip: Option<String>,
    pub wol_port: Option<u16>,
    pub location: String,
}

/// Percentage of time spent `awake` over a window, plus the number of
/// status transitions observed (§4.3 uptime computation).
#[derive(Debug, Clone, Copy)]
pub struct UptimeSummary {
    pub awake_percentage: f64,
    pub current_status: HostStatus,
    pub transition_count: u64,
}

/// Aggregate statistics surfaced by `getStats` (§4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct HostStats {
    pub total_hosts: u64,
    pub awake_hosts: u64,
    pub asleep_hosts: u64,
}

/// Persistence interface backing `HostAggregator`. The reconciliation
/// *algorithm* (MAC-first lookup, duplicate cleanup, event decisions) lives
/// in `services::host_aggregator`; this port only exposes the row-level
/// operations it composes.
#[async_trait]
pub trait HostStore: Send + Sync {
    async fn find_by_node_and_mac(&self, node_id: &str, mac: &str) -> DomainResult<Option<AggregatedHost>>;

    async fn find_by_node_and_name(&self, node_id: &str, name: &str) -> DomainResult<Option<AggregatedHost>>;

    async fn find_by_fqn(&self, fqn: &str) -> DomainResult<Option<AggregatedHost>>;

    async fn insert(&self, host: &AggregatedHost) -> DomainResult<()>;

    async fn update(&self, host: &AggregatedHost) -> DomainResult<()>;

    async fn delete_by_id(&self, id: &str) -> DomainResult<()>;

    async fn delete_by_node_and_name(&self, node_id: &str, name: &str) -> DomainResult<()>;

    /// Delete every other row sharing `(node_id, mac)` except `keep_id`
    /// (the MAC-dedup cleanup step of the reconciliation algorithm, §4.3
    /// step 3c).
    async fn delete_other_rows_with_mac(&self, node_id: &str, mac: &str, keep_id: &str) -> DomainResult<u64>;

    async fn get_all_hosts(&self) -> DomainResult<Vec<AggregatedHost>>;

    async fn get_hosts_by_node(&self, node_id: &str) -> DomainResult<Vec<AggregatedHost>>;

    /// Bulk `awake → asleep` for every row belonging to `node_id` (§4.3
    /// `markNodeHostsUnreachable`). Returns the number of rows flipped.
    async fn mark_node_hosts_unreachable(&self, node_id: &str) -> DomainResult<u64>;

    /// Delete every row belonging to `node_id` (§4.3 `removeNodeHosts`).
    async fn remove_node_hosts(&self, node_id: &str) -> DomainResult<u64>;

    async fn append_status_history(&self, entry: &HostStatusHistoryEntry) -> DomainResult<()>;

    async fn get_host_status_history(&self, fqn: &str, since: chrono::DateTime<chrono::Utc>) -> DomainResult<Vec<HostStatusHistoryEntry>>;

    async fn get_stats(&self) -> DomainResult<HostStats>;

    /// Delete status-history rows older than `retention_days`.
    async fn prune_host_status_history(&self, retention_days: u32) -> DomainResult<u64>;
}
