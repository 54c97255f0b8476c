//! The typed events that flow across the in-process event bus (§3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed set of event types the bus carries. `PluginEventBridge`
/// (see `services::event_bridge`) is the only producer; webhook/push
/// dispatchers are the only native consumers besides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    #[serde(rename = "host.discovered")]
    HostDiscovered,
    #[serde(rename = "host.removed")]
    HostRemoved,
    #[serde(rename = "host.status-transition")]
    HostStatusTransition,
    #[serde(rename = "node.connected")]
    NodeConnected,
    #[serde(rename = "node.disconnected")]
    NodeDisconnected,
    #[serde(rename = "scan.complete")]
    ScanComplete,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostDiscovered => "host.discovered",
            Self::HostRemoved => "host.removed",
            Self::HostStatusTransition => "host.status-transition",
            Self::NodeConnected => "node.connected",
            Self::NodeDisconnected => "node.disconnected",
            Self::ScanComplete => "scan.complete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "host.discovered" => Some(Self::HostDiscovered),
            "host.removed" => Some(Self::HostRemoved),
            "host.status-transition" => Some(Self::HostStatusTransition),
            "node.connected" => Some(Self::NodeConnected),
            "node.disconnected" => Some(Self::NodeDisconnected),
            "scan.complete" => Some(Self::ScanComplete),
            _ => None,
        }
    }
}

/// A single tagged domain event published on the bus (§3: `{type,
/// timestamp, data}`). `data` is kept opaque here — the payload shape is
/// whatever the producing subsystem decided, consumers parse what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }
}
