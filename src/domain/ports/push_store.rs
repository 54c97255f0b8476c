//! Push-device and notification-preference persistence port (§4.7, §6).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::push::{NotificationPreferences, PushDevice};

#[async_trait]
pub trait PushStore: Send + Sync {
    async fn register_device(&self, device: &PushDevice) -> DomainResult<()>;

    async fn list_devices(&self) -> DomainResult<Vec<PushDevice>>;

    async fn list_devices_for_user(&self, user_id: &str) -> DomainResult<Vec<PushDevice>>;

    /// Returns `true` if a row was deleted (§7: `deleteDevice` returning
    /// `false` is how `NotFoundError` is detected upstream).
    async fn delete_device_by_token(&self, token: &str) -> DomainResult<bool>;

    async fn get_preferences(&self, user_id: &str) -> DomainResult<Option<NotificationPreferences>>;

    async fn upsert_preferences(&self, preferences: &NotificationPreferences) -> DomainResult<()>;
}
