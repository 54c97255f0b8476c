//! Event fan-out: a single published event reaches both egress channels
//! independently, so a user's quiet hours suppress their push notification
//! without touching the webhook deliveries operators configured separately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use woly_coreplane::adapters::sqlite::{create_migrated_test_pool, SqlitePushStore, SqliteWebhookStore};
use woly_coreplane::domain::models::event::{Event, EventType};
use woly_coreplane::domain::models::push::{NotificationPreferences, Platform, PushDevice, PushSendResult, QuietHours};
use woly_coreplane::domain::models::webhook::{DeliveryStatus, WebhookTarget};
use woly_coreplane::domain::ports::{PushMessage, PushProvider, PushStore, WebhookStore};
use woly_coreplane::services::{EventBus, PushDispatcher, WebhookDispatcher};

struct CountingPushProvider {
    sends: Arc<AtomicUsize>,
}

#[async_trait]
impl PushProvider for CountingPushProvider {
    async fn send(&self, _token: &str, _message: &PushMessage) -> PushSendResult {
        self.sends.fetch_add(1, Ordering::SeqCst);
        PushSendResult { success: true, status_code: Some(200), error: None, permanent_failure: false }
    }
}

/// Scenario: a host status transition fires while the owning user is inside
/// their quiet-hours window. The webhook target (operator-level, not
/// per-user) still receives the delivery; the user's push device does not.
#[tokio::test]
async fn quiet_hours_suppress_push_but_not_the_webhook() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/hook").with_status(200).expect(1).create_async().await;

    let pool = create_migrated_test_pool().await.unwrap();
    let webhook_store = Arc::new(SqliteWebhookStore::new(pool.clone()));
    let push_store = Arc::new(SqlitePushStore::new(pool));

    webhook_store.create(&WebhookTarget::new("wh-1", format!("{}/hook", server.url()), vec![EventType::HostStatusTransition], None)).await.unwrap();

    let device = PushDevice::new("dev-1", "user-1", Platform::Ios, "token-1");
    push_store.register_device(&device).await.unwrap();
    let mut prefs = NotificationPreferences::new("user-1");
    prefs.events = vec![EventType::HostStatusTransition];
    // start_hour == end_hour means "quiet all day" regardless of the
    // current server clock, so the test doesn't race against wall time.
    prefs.quiet_hours = Some(QuietHours { start_hour: 0, end_hour: 0, timezone: None });
    push_store.upsert_preferences(&prefs).await.unwrap();

    let bus = Arc::new(EventBus::new());

    let webhook_dispatcher = Arc::new(WebhookDispatcher::new(webhook_store.clone() as Arc<dyn WebhookStore>, 1_000, 10));
    webhook_dispatcher.attach_to_bus(&bus);

    let sends = Arc::new(AtomicUsize::new(0));
    let push_dispatcher = Arc::new(PushDispatcher::new(push_store.clone() as Arc<dyn PushStore>, Arc::new(CountingPushProvider { sends: sends.clone() }), true));
    push_dispatcher.attach_to_bus(&bus);

    bus.publish(Event::new(EventType::HostStatusTransition, json!({"hostFqn": "pc-a@lab-node-1", "oldStatus": "awake", "newStatus": "asleep"})));

    // Both dispatchers fan out via tokio::spawn off the publisher's task;
    // give them a moment to complete their (mocked/local) I/O.
    tokio::time::sleep(Duration::from_millis(200)).await;

    mock.assert_async().await;
    assert_eq!(sends.load(Ordering::SeqCst), 0, "a device whose owner is in quiet hours must not receive a push");

    let logs = webhook_store.list_deliveries("wh-1", 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, DeliveryStatus::Success);
}

/// Scenario: outside quiet hours, a subscribed device does receive the push
/// alongside the webhook delivery.
#[tokio::test]
async fn outside_quiet_hours_both_channels_fire() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/hook").with_status(200).expect(1).create_async().await;

    let pool = create_migrated_test_pool().await.unwrap();
    let webhook_store = Arc::new(SqliteWebhookStore::new(pool.clone()));
    let push_store = Arc::new(SqlitePushStore::new(pool));

    webhook_store.create(&WebhookTarget::new("wh-1", format!("{}/hook", server.url()), vec![EventType::ScanComplete], None)).await.unwrap();

    let device = PushDevice::new("dev-1", "user-1", Platform::Android, "token-1");
    push_store.register_device(&device).await.unwrap();
    let mut prefs = NotificationPreferences::new("user-1");
    prefs.events = vec![EventType::ScanComplete];
    push_store.upsert_preferences(&prefs).await.unwrap();

    let bus = Arc::new(EventBus::new());

    let webhook_dispatcher = Arc::new(WebhookDispatcher::new(webhook_store.clone() as Arc<dyn WebhookStore>, 1_000, 10));
    webhook_dispatcher.attach_to_bus(&bus);

    let sends = Arc::new(AtomicUsize::new(0));
    let push_dispatcher = Arc::new(PushDispatcher::new(push_store.clone() as Arc<dyn PushStore>, Arc::new(CountingPushProvider { sends: sends.clone() }), true));
    push_dispatcher.attach_to_bus(&bus);

    bus.publish(Event::new(EventType::ScanComplete, json!({"nodeId": "node-1", "hostCount": 3})));

    tokio::time::sleep(Duration::from_millis(200)).await;

    mock.assert_async().await;
    assert_eq!(sends.load(Ordering::SeqCst), 1);
}
