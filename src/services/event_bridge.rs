//! Adapts the native events of `NodeRegistry` and `HostAggregator` onto the
//! single typed `EventBus` (§4.5). Neither of those subsystems publishes to
//! the bus directly — this is the one place that translates their
//! domain-specific event shapes into the bus's `{type, timestamp, data}`
//! envelope.

use std::sync::Arc;

use serde_json::json;

use crate::domain::models::event::{Event, EventType};
use crate::domain::ports::{NodeEvent, NodeRegistry};
use crate::services::event_bus::EventBus;
use crate::services::host_aggregator::HostAggregatorEvent;

pub struct PluginEventBridge {
    bus: Arc<EventBus>,
}

impl PluginEventBridge {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Register this bridge as a `NodeRegistry` subscriber. Returns the
    /// subscription token so the caller can `unsubscribe` on shutdown.
    pub fn attach_to_registry(self: &Arc<Self>, registry: &dyn NodeRegistry) -> u64 {
        let bridge = Arc::clone(self);
        registry.subscribe(Arc::new(move |event| bridge.handle_node_event(event)))
    }

    fn handle_node_event(&self, event: NodeEvent) {
        let mapped = match event {
            NodeEvent::Connected { node_id } => Some(Event::new(EventType::NodeConnected, json!({ "nodeId": node_id }))),
            NodeEvent::Disconnected { node_id } => Some(Event::new(EventType::NodeDisconnected, json!({ "nodeId": node_id }))),
            NodeEvent::ScanComplete { node_id, host_count } => Some(Event::new(EventType::ScanComplete, json!({ "nodeId": node_id, "hostCount": host_count }))),
            // Command results and heartbeats are consumed directly by
            // CommandRouter / the node liveness tracker; they have no
            // EventBus counterpart (§4.5's event-name mapping omits them).
            NodeEvent::CommandResult(_) | NodeEvent::Heartbeat { .. } => None,
        };
        if let Some(event) = mapped {
            self.bus.publish(event);
        }
    }

    /// Translate and publish one of `HostAggregator`'s native events.
    /// `HostAggregator` calls this explicitly after each reconciliation
    /// rather than being handed a reference to the bus itself, keeping the
    /// aggregator's own tests free of bus wiring.
    pub fn publish_host_event(&self, event: HostAggregatorEvent) {
        let mapped = match event {
            HostAggregatorEvent::Discovered(host) => Event::new(EventType::HostDiscovered, json!({ "hostFqn": host.fully_qualified_name, "nodeId": host.node_id })),
            HostAggregatorEvent::Removed { fqn } => Event::new(EventType::HostRemoved, json!({ "hostFqn": fqn })),
            HostAggregatorEvent::StatusTransition(entry) => Event::new(
                EventType::HostStatusTransition,
                json!({
                    "hostFqn": entry.host_fqn,
                    "oldStatus": entry.old_status,
                    "newStatus": entry.new_status,
                    "changedAt": entry.changed_at,
                }),
            ),
        };
        self.bus.publish(mapped);
    }
}
