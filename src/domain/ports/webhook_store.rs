//! Webhook subscription and delivery-log persistence port (§4.6, §6).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::event::EventType;
use crate::domain::models::webhook::{WebhookDeliveryLog, WebhookTarget};

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn create(&self, target: &WebhookTarget) -> DomainResult<()>;

    async fn list_all(&self) -> DomainResult<Vec<WebhookTarget>>;

    /// Targets subscribed to `event_type` — the set `WebhookDispatcher`
    /// fans a published event out to (§4.6).
    async fn list_targets_by_event(&self, event_type: EventType) -> DomainResult<Vec<WebhookTarget>>;

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<WebhookTarget>>;

    async fn delete(&self, id: &str) -> DomainResult<()>;

    async fn append_delivery_log(&self, log: &WebhookDeliveryLog) -> DomainResult<()>;

    async fn list_deliveries(&self, webhook_id: &str, limit: u32) -> DomainResult<Vec<WebhookDeliveryLog>>;
}
