//! Fans a published `Event` out to registered mobile devices via a
//! per-platform `PushProvider`, honoring per-user preferences and quiet
//! hours, and pruning devices a provider reports as permanently dead (§4.7).

use std::sync::Arc;

use chrono::{Timelike, Utc};

use crate::domain::models::event::Event;
use crate::domain::ports::{PushMessage, PushProvider, PushStore};
use crate::services::event_bus::EventBus;

pub struct PushDispatcher {
    store: Arc<dyn PushStore>,
    provider: Arc<dyn PushProvider>,
    enabled: bool,
}

impl PushDispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn PushStore>, provider: Arc<dyn PushProvider>, enabled: bool) -> Self {
        Self { store, provider, enabled }
    }

    /// Subscribe this dispatcher to every event on the bus.
    pub fn attach_to_bus(self: &Arc<Self>, bus: &EventBus) -> u64 {
        let dispatcher = Arc::clone(self);
        bus.subscribe_all(move |event| {
            let dispatcher = Arc::clone(&dispatcher);
            let event = event.clone();
            tokio::spawn(async move { dispatcher.dispatch(event).await });
        })
    }

    /// Deliver `event` to every device whose owner's preferences allow it
    /// right now (§4.7: enabled, subscribed, outside quiet hours). Quiet
    /// hours are evaluated against the server's UTC clock — `QuietHours`
    /// carries a timezone name for a future per-user conversion, not
    /// resolved here.
    pub async fn dispatch(&self, event: Event) {
        if !self.enabled {
            return;
        }

        let devices = match self.store.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                tracing::error!(%err, "failed to list push devices");
                return;
            }
        };

        let current_hour = Utc::now().hour() as u8;
        let message = event_to_message(&event);

        for device in devices {
            let preferences = match self.store.get_preferences(&device.user_id).await {
                Ok(Some(prefs)) => prefs,
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(%err, user_id = %device.user_id, "failed to load notification preferences");
                    continue;
                }
            };
            if !preferences.allows(event.event_type, current_hour) {
                continue;
            }

            let result = self.provider.send(&device.token, &message).await;
            if !result.success && result.permanent_failure {
                tracing::info!(token = %device.token, "pruning device after permanent push failure");
                if let Err(err) = self.store.delete_device_by_token(&device.token).await {
                    tracing::error!(%err, "failed to prune dead push device");
                }
            } else if !result.success {
                tracing::warn!(token = %device.token, error = ?result.error, "push delivery failed");
            }
        }
    }
}

/// Title/body for each event type (§4.7). `host.status-transition` picks
/// between "Host Awake" and "Host Asleep" by inspecting `data.newStatus`
/// (falling back to `data.status`) rather than using one title for every
/// transition.
fn event_to_message(event: &Event) -> PushMessage {
    let (title, body) = match event.event_type.as_str() {
        "host.discovered" => ("Host Discovered".to_string(), host_fqn_summary(event, "is now tracked")),
        "host.removed" => ("Host Removed".to_string(), host_fqn_summary(event, "was removed")),
        "host.status-transition" => {
            let new_status = event.data.get("newStatus").or_else(|| event.data.get("status")).and_then(|v| v.as_str()).unwrap_or("");
            let title = if new_status == "asleep" { "Host Asleep" } else { "Host Awake" };
            (title.to_string(), host_fqn_summary(event, "changed status"))
        }
        "node.connected" => ("Node Connected".to_string(), "A node agent came online".to_string()),
        "node.disconnected" => ("Node Offline".to_string(), "A node agent went offline".to_string()),
        "scan.complete" => ("Scan Complete".to_string(), "A node finished a host scan".to_string()),
        other => (other.to_string(), "Unrecognized event".to_string()),
    };
    PushMessage { title, body, data: event.data.clone() }
}

fn host_fqn_summary(event: &Event, suffix: &str) -> String {
    let fqn = event.data.get("hostFqn").and_then(|v| v.as_str()).unwrap_or("a host");
    format!("{fqn} {suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::EventType;
    use crate::domain::models::push::{NotificationPreferences, Platform, PushDevice, PushSendResult, QuietHours};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakePushStore {
        devices: Vec<PushDevice>,
        preferences: std::collections::HashMap<String, NotificationPreferences>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushStore for FakePushStore {
        async fn register_device(&self, _device: &PushDevice) -> crate::domain::errors::DomainResult<()> {
            Ok(())
        }
        async fn list_devices(&self) -> crate::domain::errors::DomainResult<Vec<PushDevice>> {
            Ok(self.devices.clone())
        }
        async fn list_devices_for_user(&self, user_id: &str) -> crate::domain::errors::DomainResult<Vec<PushDevice>> {
            Ok(self.devices.iter().filter(|d| d.user_id == user_id).cloned().collect())
        }
        async fn delete_device_by_token(&self, token: &str) -> crate::domain::errors::DomainResult<bool> {
            self.deleted.lock().unwrap().push(token.to_string());
            Ok(true)
        }
        async fn get_preferences(&self, user_id: &str) -> crate::domain::errors::DomainResult<Option<NotificationPreferences>> {
            Ok(self.preferences.get(user_id).cloned())
        }
        async fn upsert_preferences(&self, _preferences: &NotificationPreferences) -> crate::domain::errors::DomainResult<()> {
            Ok(())
        }
    }

    struct AlwaysFailProvider;
    #[async_trait]
    impl PushProvider for AlwaysFailProvider {
        async fn send(&self, _token: &str, _message: &PushMessage) -> PushSendResult {
            PushSendResult { success: false, status_code: Some(410), error: Some("gone".into()), permanent_failure: true }
        }
    }

    fn prefs(user_id: &str, events: Vec<EventType>, quiet_hours: Option<QuietHours>) -> NotificationPreferences {
        let mut p = NotificationPreferences::new(user_id);
        p.events = events;
        p.quiet_hours = quiet_hours;
        p
    }

    #[tokio::test]
    async fn a_permanently_failing_device_is_pruned() {
        let device = PushDevice::new("d1", "user-1", Platform::Ios, "token-1");
        let store = Arc::new(FakePushStore {
            devices: vec![device],
            preferences: [("user-1".to_string(), prefs("user-1", vec![EventType::HostDiscovered], None))].into_iter().collect(),
            deleted: Mutex::new(Vec::new()),
        });
        let dispatcher = PushDispatcher::new(store.clone(), Arc::new(AlwaysFailProvider), true);
        dispatcher.dispatch(Event::new(EventType::HostDiscovered, json!({"hostFqn": "pc-a@lab-node-1"}))).await;
        assert_eq!(store.deleted.lock().unwrap().as_slice(), ["token-1"]);
    }

    #[tokio::test]
    async fn disabled_dispatcher_sends_nothing() {
        let store = Arc::new(FakePushStore { devices: vec![], preferences: Default::default(), deleted: Mutex::new(Vec::new()) });
        let dispatcher = PushDispatcher::new(store, Arc::new(AlwaysFailProvider), false);
        dispatcher.dispatch(Event::new(EventType::HostDiscovered, json!({}))).await;
    }

    #[test]
    fn status_transition_picks_the_title_matching_the_new_status() {
        let awake = event_to_message(&Event::new(EventType::HostStatusTransition, json!({"hostFqn": "pc-a@lab-node-1", "newStatus": "awake"})));
        assert_eq!(awake.title, "Host Awake");

        let asleep = event_to_message(&Event::new(EventType::HostStatusTransition, json!({"hostFqn": "pc-a@lab-node-1", "newStatus": "asleep"})));
        assert_eq!(asleep.title, "Host Asleep");
    }

    #[test]
    fn node_disconnected_uses_the_offline_title() {
        let message = event_to_message(&Event::new(EventType::NodeDisconnected, json!({"nodeId": "node-1"})));
        assert_eq!(message.title, "Node Offline");
    }

    #[tokio::test]
    async fn a_user_without_preferences_receives_nothing() {
        let device = PushDevice::new("d1", "user-1", Platform::Ios, "token-1");
        let store = Arc::new(FakePushStore { devices: vec![device], preferences: Default::default(), deleted: Mutex::new(Vec::new()) });
        let dispatcher = PushDispatcher::new(store.clone(), Arc::new(AlwaysFailProvider), true);
        dispatcher.dispatch(Event::new(EventType::HostDiscovered, json!({}))).await;
        assert!(store.deleted.lock().unwrap().is_empty());
    }
}
