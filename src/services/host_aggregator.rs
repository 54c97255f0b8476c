//! MAC-address-first host reconciliation (§4.3).
//!
//! `HostAggregator` is the only writer of `aggregated_hosts` and
//! `host_status_history`. It owns the reconciliation algorithm that turns a
//! raw per-node sighting into a stable, deduplicated row, and it is the
//! source of the aggregator's own native events (`HostAggregatorEvent`),
//! which `PluginEventBridge` adapts onto the typed `EventBus`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::host::{AggregatedHost, HostStatus, HostStatusHistoryEntry};
use crate::domain::ports::{HostSighting, HostStats, HostStore};

/// TTL for a `saveHostPortScanSnapshot` entry (§4.3) — how long a cached
/// scan result is considered fresh enough that a caller may skip re-scanning.
pub const PORT_SCAN_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;

/// The last port scan recorded for a host, as handed to `CommandRouter`'s
/// `scan-host-ports` route so it can decide whether to skip re-scanning.
#[derive(Debug, Clone)]
pub struct PortScanSnapshot {
    pub scanned_at: DateTime<Utc>,
    pub open_ports: Vec<u16>,
}

/// A native event produced by the aggregator, distinct from (and a source
/// for) the central `EventBus`'s `Event` envelope.
#[derive(Debug, Clone)]
pub enum HostAggregatorEvent {
    Discovered(AggregatedHost),
    Removed { fqn: String },
    StatusTransition(HostStatusHistoryEntry),
}

/// Outcome of reconciling one sighting, mainly useful to callers (like
/// `CommandRouter`'s `scan-hosts` route) that need the resulting row.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Inserted(AggregatedHost),
    Updated(AggregatedHost),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn into_host(self) -> AggregatedHost {
        match self {
            Self::Inserted(h) | Self::Updated(h) => h,
        }
    }
}

pub struct HostAggregator {
    store: Arc<dyn HostStore>,
    port_scan_cache: moka::sync::Cache<String, PortScanSnapshot>,
}

impl HostAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn HostStore>) -> Self {
        Self {
            store,
            port_scan_cache: moka::sync::Cache::builder().max_capacity(10_000).time_to_live(Duration::from_millis(PORT_SCAN_CACHE_TTL_MS)).build(),
        }
    }

    /// Record the latest port-scan result for a host (§4.3
    /// `saveHostPortScanSnapshot`). Entries expire after
    /// `PORT_SCAN_CACHE_TTL_MS`; whether a fresh entry is reason enough to
    /// skip a re-scan is the caller's call, not this cache's.
    pub fn save_host_port_scan_snapshot(&self, fqn: &str, open_ports: Vec<u16>) {
        self.port_scan_cache.insert(fqn.to_string(), PortScanSnapshot { scanned_at: Utc::now(), open_ports });
    }

    /// Look up the last recorded scan for a host, if still within TTL.
    #[must_use]
    pub fn get_host_port_scan_snapshot(&self, fqn: &str) -> Option<PortScanSnapshot> {
        self.port_scan_cache.get(fqn)
    }

    /// Reconcile one agent-reported sighting against the aggregated table
    /// (§4.3 steps 1-5):
    ///
    /// 1. If the sighting carries a non-empty MAC, look the row up by
    ///    `(node_id, mac)` first — MAC is the durable identity.
    /// 2. On a MAC hit: refresh the row's fields, mark it `awake`, and
    ///    delete any other row sharing that MAC under the same node (a
    ///    duplicate left behind by a prior rename or reinstall).
    /// 3. On a MAC miss, fall back to `(node_id, name)` — the sighting may
    ///    be the first report of a new NIC on an already-known host.
    /// 4. On a name hit: adopt the new MAC onto the existing row.
    /// 5. On a miss by both keys: insert a fresh row, starting `awake`.
    pub async fn reconcile_sighting(&self, sighting: HostSighting) -> DomainResult<(ReconcileOutcome, Vec<HostAggregatorEvent>)> {
        let mut events = Vec::new();

        let existing = if sighting.mac.is_empty() {
            None
        } else {
            self.store.find_by_node_and_mac(&sighting.node_id, &sighting.mac).await?
        };

        if let Some(mut host) = existing {
            self.apply_sighting_to_row(&mut host, &sighting, &mut events);
            self.store.update(&host).await?;
            for event in &events {
                if let HostAggregatorEvent::StatusTransition(entry) = event {
                    self.store.append_status_history(entry).await?;
                }
            }
            if !sighting.mac.is_empty() {
                self.store.delete_other_rows_with_mac(&sighting.node_id, &sighting.mac, &host.id).await?;
            }
            return Ok((ReconcileOutcome::Updated(host), events));
        }

        if let Some(mut host) = self.store.find_by_node_and_name(&sighting.node_id, &sighting.name).await? {
            host.mac = sighting.mac.clone();
            self.apply_sighting_to_row(&mut host, &sighting, &mut events);
            self.store.update(&host).await?;
            for event in &events {
                if let HostAggregatorEvent::StatusTransition(entry) = event {
                    self.store.append_status_history(entry).await?;
                }
            }
            return Ok((ReconcileOutcome::Updated(host), events));
        }

        let host = AggregatedHost::new(Uuid::new_v4().to_string(), sighting.node_id.clone(), sighting.name.clone(), sighting.mac.clone(), sighting.ip.clone(), sighting.wol_port, sighting.location.clone());
        self.store.insert(&host).await?;
        events.push(HostAggregatorEvent::Discovered(host.clone()));
        Ok((ReconcileOutcome::Inserted(host), events))
    }

    fn apply_sighting_to_row(&self, host: &mut AggregatedHost, sighting: &HostSighting, events: &mut Vec<HostAggregatorEvent>) {
        host.name = sighting.name.clone();
        host.ip = sighting.ip.clone();
        host.wol_port = sighting.wol_port;
        host.location = sighting.location.clone();
        host.refresh_fqn();
        host.last_seen = chrono::Utc::now();
        if let Some(entry) = host.record_status_change(HostStatus::Awake) {
            events.push(HostAggregatorEvent::StatusTransition(entry));
        }
    }

    /// Flip every `awake` host under `node_id` to `asleep` — called when a
    /// node disconnects (§4.3 `markNodeHostsUnreachable`). Fetches rows
    /// individually rather than delegating to the store's bulk update so
    /// each genuine transition produces its own event.
    pub async fn mark_node_hosts_unreachable(&self, node_id: &str) -> DomainResult<Vec<HostAggregatorEvent>> {
        let mut events = Vec::new();
        for mut host in self.store.get_hosts_by_node(node_id).await? {
            if let Some(entry) = host.record_status_change(HostStatus::Asleep) {
                self.store.update(&host).await?;
                self.store.append_status_history(&entry).await?;
                events.push(HostAggregatorEvent::StatusTransition(entry));
            }
        }
        Ok(events)
    }

    /// Remove every row belonging to `node_id` (§4.3 `removeNodeHosts`),
    /// e.g. when a node is decommissioned.
    pub async fn remove_node_hosts(&self, node_id: &str) -> DomainResult<Vec<HostAggregatorEvent>> {
        let hosts = self.store.get_hosts_by_node(node_id).await?;
        self.store.remove_node_hosts(node_id).await?;
        Ok(hosts.into_iter().map(|h| HostAggregatorEvent::Removed { fqn: h.fully_qualified_name }).collect())
    }

    /// Delete a single host by its fully-qualified name, e.g. the
    /// `delete-host` command's aggregator-side cleanup after the node
    /// confirms the host is gone.
    pub async fn remove_host_by_fqn(&self, fqn: &str) -> DomainResult<Option<HostAggregatorEvent>> {
        let Some(host) = self.store.find_by_fqn(fqn).await? else {
            return Ok(None);
        };
        self.store.delete_by_id(&host.id).await?;
        Ok(Some(HostAggregatorEvent::Removed { fqn: host.fully_qualified_name }))
    }

    pub async fn get_stats(&self) -> DomainResult<HostStats> {
        self.store.get_stats().await
    }

    /// Look a host up by its fully-qualified name — the primary way
    /// `CommandRouter` resolves an operator-supplied FQN back to a
    /// `(node_id, mac)` pair before routing a host-targeted command.
    pub async fn find_by_fqn(&self, fqn: &str) -> DomainResult<Option<AggregatedHost>> {
        self.store.find_by_fqn(fqn).await
    }

    /// Percentage of time spent `awake` over `[since, now]`, derived from
    /// the status-history log rather than sampled polling (§4.3).
    pub async fn uptime_since(&self, fqn: &str, since: chrono::DateTime<chrono::Utc>) -> DomainResult<Option<crate::domain::ports::UptimeSummary>> {
        let Some(host) = self.store.find_by_fqn(fqn).await? else {
            return Ok(None);
        };
        let history = self.store.get_host_status_history(fqn, since).await?;
        let now = chrono::Utc::now();

        if history.is_empty() {
            let awake_percentage = if host.status == HostStatus::Awake { 100.0 } else { 0.0 };
            return Ok(Some(crate::domain::ports::UptimeSummary { awake_percentage, current_status: host.status, transition_count: 0 }));
        }

        let window_ms = (now - since).num_milliseconds().max(1) as f64;
        let mut awake_ms = 0i64;
        let mut cursor = since;
        let mut cursor_status = history[0].old_status;

        for entry in &history {
            if cursor_status == HostStatus::Awake {
                awake_ms += (entry.changed_at - cursor).num_milliseconds();
            }
            cursor = entry.changed_at;
            cursor_status = entry.new_status;
        }
        if cursor_status == HostStatus::Awake {
            awake_ms += (now - cursor).num_milliseconds();
        }

        Ok(Some(crate::domain::ports::UptimeSummary {
            awake_percentage: (awake_ms.max(0) as f64 / window_ms * 100.0).clamp(0.0, 100.0),
            current_status: host.status,
            transition_count: history.len() as u64,
        }))
    }
}
