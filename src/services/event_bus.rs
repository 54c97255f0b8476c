//! Synchronous in-process pub/sub for the tagged domain events defined in
//! `domain::models::event` (§4.5).
//!
//! Deliberately simpler than a persisted/broadcast event log: `publish`
//! calls every subscribed handler in-line, on the publisher's own task, and
//! a handler panic is caught and logged rather than propagated — one
//! misbehaving subscriber must never stop an event from reaching the rest
//! (§4.5, §5).

use std::panic::AssertUnwindSafe;
use std::sync::RwLock;

use crate::domain::models::event::{Event, EventType};

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    token: u64,
    event_type: Option<EventType>,
    handler: Handler,
}

/// In-process event bus. `None` as a subscription's event type means "every
/// event" — how `WebhookDispatcher`/`PushDispatcher` register themselves
/// once and filter per-target internally rather than resubscribing per type.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_token: std::sync::atomic::AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_token: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Subscribe to every event type. Returns a token usable with `unsubscribe`.
    pub fn subscribe_all(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.register(None, handler)
    }

    /// Subscribe to one event type only.
    pub fn subscribe(&self, event_type: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        self.register(Some(event_type), handler)
    }

    fn register(&self, event_type: Option<EventType>, handler: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        let token = self.next_token.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut subs = self.subscriptions.write().expect("event bus subscription lock poisoned");
        subs.push(Subscription { token, event_type, handler: Box::new(handler) });
        token
    }

    pub fn unsubscribe(&self, token: u64) {
        let mut subs = self.subscriptions.write().expect("event bus subscription lock poisoned");
        subs.retain(|s| s.token != token);
    }

    /// Deliver `event` to every matching subscriber, in subscription order.
    /// A handler that panics is caught and logged; later handlers still run.
    pub fn publish(&self, event: Event) {
        let subs = self.subscriptions.read().expect("event bus subscription lock poisoned");
        for sub in subs.iter() {
            if sub.event_type.is_some_and(|t| t != event.event_type) {
                continue;
            }
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(&event)));
            if let Err(panic) = result {
                let message = panic.downcast_ref::<&str>().copied().or_else(|| panic.downcast_ref::<String>().map(String::as_str)).unwrap_or("<non-string panic payload>");
                tracing::error!(event_type = event.event_type.as_str(), %message, "event subscriber panicked");
            }
        }
    }

    /// Remove every subscription. Mainly useful for test teardown.
    pub fn clear(&self) {
        self.subscriptions.write().expect("event bus subscription lock poisoned").clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().expect("event bus subscription lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscribers_only_see_matching_event_types() {
        let bus = EventBus::new();
        let host_events = Arc::new(AtomicUsize::new(0));
        let host_events_clone = host_events.clone();
        bus.subscribe(EventType::HostDiscovered, move |_| {
            host_events_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::new(EventType::HostDiscovered, json!({})));
        bus.publish(Event::new(EventType::ScanComplete, json!({})));

        assert_eq!(host_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_all_receives_every_event_type() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe_all(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::new(EventType::HostDiscovered, json!({})));
        bus.publish(Event::new(EventType::NodeConnected, json!({})));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let token = bus.subscribe_all(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.unsubscribe(token);

        bus.publish(Event::new(EventType::HostDiscovered, json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_handler_does_not_prevent_later_handlers_from_running() {
        let bus = EventBus::new();
        bus.subscribe_all(|_| panic!("boom"));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe_all(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::new(EventType::HostDiscovered, json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_all_subscriptions() {
        let bus = EventBus::new();
        bus.subscribe_all(|_| {});
        bus.subscribe_all(|_| {});
        assert_eq!(bus.subscriber_count(), 2);
        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
