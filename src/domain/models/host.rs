//! Aggregated host domain model: the per-node, per-host projection that
//! `HostAggregator` maintains by reconciling agent-reported sightings
//! keyed by MAC address (§3, §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed power state of a physical host. There is no "unreachable" state
/// in the aggregated table — it is represented by forcing `awake → asleep`
/// when a node disconnects (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Awake,
    Asleep,
}

impl HostStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Awake => "awake",
            Self::Asleep => "asleep",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "awake" => Some(Self::Awake),
            "asleep" => Some(Self::Asleep),
            _ => None,
        }
    }
}

/// One row of the append-only status-transition log. `old_status` and
/// `new_status` are never equal for an inserted row (§3) — same-status
/// updates are filtered out before a row is ever constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatusHistoryEntry {
    pub host_fqn: String,
    pub old_status: HostStatus,
    pub new_status: HostStatus,
    pub changed_at: DateTime<Utc>,
}

/// A reconciled host record, keyed by `(node_id, mac)` when `mac` is
/// non-empty (§3 invariant (a)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHost {
    pub id: String,
    pub node_id: String,
    pub name: String,
    pub mac: String,
    pub secondary_macs: Vec<String>,
    pub ip: Option<String>,
    pub wol_port: Option<u16>,
    pub status: HostStatus,
    pub location: String,
    pub fully_qualified_name: String,
    pub discovered: Option<bool>,
    pub ping_responsive: Option<bool>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derives `"{name}@{sanitizedLocation}-{nodeId}"` (§3): spaces in
/// `location` become hyphens; the result uniquely identifies a row and is
/// the form operators percent-encode in URLs.
#[must_use]
pub fn compute_fqn(name: &str, location: &str, node_id: &str) -> String {
    let sanitized_location = location.replace(' ', "-");
    format!("{name}@{sanitized_location}-{node_id}")
}

impl AggregatedHost {
    /// Build a fresh row from a node's sighting. A sighting implies the
    /// node observed the host up, so new rows start `awake` (§4.3 step 5,
    /// the insert branch of the reconciliation algorithm).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(id: impl Into<String>, node_id: impl Into<String>, name: impl Into<String>, mac: impl Into<String>, ip: Option<String>, wol_port: Option<u16>, location: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let name = name.into();
        let location = location.into();
        let fully_qualified_name = compute_fqn(&name, &location, &node_id);
        let now = Utc::now();
        Self {
            id: id.into(),
            node_id,
            name,
            mac: mac.into(),
            secondary_macs: Vec::new(),
            ip,
            wol_port,
            status: HostStatus::Awake,
            location,
            fully_qualified_name,
            discovered: Some(true),
            ping_responsive: None,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute `fully_qualified_name` after `name` or `location` change.
    pub fn refresh_fqn(&mut self) {
        self.fully_qualified_name = compute_fqn(&self.name, &self.location, &self.node_id);
    }

    /// Apply a status change, returning the history row to persist iff the
    /// status actually changed (§3: "entries are produced only on a genuine
    /// transition"). Always bumps `updated_at`; `last_seen` is the caller's
    /// responsibility since not every status change is itself a sighting.
    pub fn record_status_change(&mut self, new_status: HostStatus) -> Option<HostStatusHistoryEntry> {
        if self.status == new_status {
            return None;
        }
        let old_status = self.status;
        self.status = new_status;
        self.updated_at = Utc::now();
        Some(HostStatusHistoryEntry {
            host_fqn: self.fully_qualified_name.clone(),
            old_status,
            new_status,
            changed_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregatedHost {
        AggregatedHost::new("host-1", "node-1", "pc-a", "aa:bb:cc:dd:ee:ff", Some("10.0.0.5".into()), None, "lab")
    }

    #[test]
    fn new_host_starts_awake_with_derived_fqn() {
        let host = sample();
        assert_eq!(host.status, HostStatus::Awake);
        assert_eq!(host.fully_qualified_name, "pc-a@lab-node-1");
    }

    #[test]
    fn compute_fqn_replaces_spaces_in_location_with_hyphens() {
        assert_eq!(compute_fqn("desktop", "back office", "node-9"), "desktop@back-office-node-9");
    }

    #[test]
    fn record_status_change_is_noop_when_status_unchanged() {
        let mut host = sample();
        assert!(host.record_status_change(HostStatus::Awake).is_none());
    }

    #[test]
    fn record_status_change_produces_entry_on_genuine_transition() {
        let mut host = sample();
        let entry = host.record_status_change(HostStatus::Asleep).expect("status changed");
        assert_eq!(entry.old_status, HostStatus::Awake);
        assert_eq!(entry.new_status, HostStatus::Asleep);
        assert_eq!(entry.host_fqn, "pc-a@lab-node-1");
        assert_ne!(entry.old_status, entry.new_status);
    }

    #[test]
    fn refresh_fqn_reflects_renamed_host() {
        let mut host = sample();
        host.name = "pc-A".into();
        host.refresh_fqn();
        assert_eq!(host.fully_qualified_name, "pc-A@lab-node-1");
    }

    #[test]
    fn host_status_round_trips_through_as_str() {
        assert_eq!(HostStatus::from_str(HostStatus::Awake.as_str()), Some(HostStatus::Awake));
        assert_eq!(HostStatus::from_str(HostStatus::Asleep.as_str()), Some(HostStatus::Asleep));
        assert_eq!(HostStatus::from_str("unknown"), None);
    }
}
