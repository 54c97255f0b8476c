//! Fans a published `Event` out to every subscribed webhook target over
//! HTTP, with HMAC request signing and bounded retry (§4.6).
//!
//! `WebhookDispatcher` subscribes to the `EventBus` for every event type and
//! looks targets up per-event rather than maintaining its own cache — the
//! target list is small and changes rarely enough that a DB round trip per
//! publish is the simpler trade (see DESIGN.md).

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::models::event::Event;
use crate::domain::models::webhook::{webhook_retry_delay_ms, DeliveryStatus, WebhookDeliveryLog, MAX_DELIVERY_ATTEMPTS};
use crate::domain::ports::WebhookStore;
use crate::services::event_bus::EventBus;

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    http: reqwest::Client,
    retry_base_delay_ms: u64,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, delivery_timeout_ms: u64, retry_base_delay_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(delivery_timeout_ms))
            .build()
            .expect("webhook HTTP client configuration is valid");
        Self { store, http, retry_base_delay_ms }
    }

    /// Subscribe this dispatcher to every event on the bus. Returns the
    /// subscription token so the caller can `unsubscribe` on shutdown.
    pub fn attach_to_bus(self: &Arc<Self>, bus: &EventBus) -> u64 {
        let dispatcher = Arc::clone(self);
        bus.subscribe_all(move |event| {
            let dispatcher = Arc::clone(&dispatcher);
            let event = event.clone();
            tokio::spawn(async move { dispatcher.dispatch(event).await });
        })
    }

    /// Deliver `event` to every target subscribed to its type, one retry
    /// loop per target, run concurrently.
    pub async fn dispatch(&self, event: Event) {
        let targets = match self.store.list_targets_by_event(event.event_type).await {
            Ok(targets) => targets,
            Err(err) => {
                tracing::error!(%err, "failed to load webhook targets for event");
                return;
            }
        };

        let deliveries = targets.into_iter().map(|target| self.deliver_with_retry(target, event.clone()));
        futures::future::join_all(deliveries).await;
    }

    async fn deliver_with_retry(&self, target: crate::domain::models::webhook::WebhookTarget, event: Event) {
        let body = json!({
            "type": event.event_type.as_str(),
            "timestamp": event.timestamp,
            "data": event.data,
        });
        let body_bytes = serde_json::to_vec(&body).expect("event payload serializes");

        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            if attempt > 1 {
                let delay = webhook_retry_delay_ms(self.retry_base_delay_ms, attempt);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let mut request = self
                .http
                .post(&target.url)
                .header("Content-Type", "application/json")
                .header("User-Agent", concat!("woly-coreplane/", env!("CARGO_PKG_VERSION")))
                .header("X-Woly-Event", event.event_type.as_str())
                .header("X-Woly-Delivery-Attempt", attempt.to_string())
                .body(body_bytes.clone());
            if let Some(secret) = &target.secret {
                request = request.header("X-Woly-Signature", sign_payload(secret, &body_bytes));
            }

            let log = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    WebhookDeliveryLog::new(Uuid::new_v4().to_string(), target.id.clone(), event.event_type, attempt, DeliveryStatus::Success, Some(response.status().as_u16()), None, body.clone())
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    WebhookDeliveryLog::new(Uuid::new_v4().to_string(), target.id.clone(), event.event_type, attempt, DeliveryStatus::Failure, Some(status), Some(format!("non-success status {status}")), body.clone())
                }
                Err(err) => WebhookDeliveryLog::new(Uuid::new_v4().to_string(), target.id.clone(), event.event_type, attempt, DeliveryStatus::Failure, None, Some(err.to_string()), body.clone()),
            };

            let succeeded = log.status == DeliveryStatus::Success;
            if let Err(err) = self.store.append_delivery_log(&log).await {
                tracing::error!(%err, webhook_id = %target.id, "failed to persist webhook delivery log");
            }
            if succeeded {
                return;
            }
        }
        tracing::warn!(webhook_id = %target.id, event_type = event.event_type.as_str(), "webhook delivery exhausted all attempts");
    }
}

fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
