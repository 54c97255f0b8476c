//! SQLite implementation of `PushStore`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::push::{NotificationPreferences, Platform, PushDevice, QuietHours};
use crate::domain::ports::PushStore;

use super::parse_datetime;

#[derive(Clone)]
pub struct SqlitePushStore {
    pool: SqlitePool,
}

impl SqlitePushStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> DomainResult<PushDevice> {
        let platform: String = row.try_get("platform")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(PushDevice {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            platform: Platform::from_str(&platform)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored platform {platform:?}")))?,
            token: row.try_get("token")?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn row_to_preferences(row: &sqlx::sqlite::SqliteRow) -> DomainResult<NotificationPreferences> {
        let enabled: i64 = row.try_get("enabled")?;
        let events_raw: String = row.try_get("events")?;
        let quiet_hours_raw: Option<String> = row.try_get("quiet_hours")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(NotificationPreferences {
            user_id: row.try_get("user_id")?,
            enabled: enabled != 0,
            events: serde_json::from_str(&events_raw)?,
            quiet_hours: quiet_hours_raw.map(|s| serde_json::from_str::<QuietHours>(&s)).transpose()?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }
}

#[async_trait]
impl PushStore for SqlitePushStore {
    async fn register_device(&self, device: &PushDevice) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO push_devices (id, user_id, platform, token, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id, platform = excluded.platform, updated_at = excluded.updated_at",
        )
        .bind(&device.id)
        .bind(&device.user_id)
        .bind(device.platform.as_str())
        .bind(&device.token)
        .bind(device.created_at.to_rfc3339())
        .bind(device.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_devices(&self) -> DomainResult<Vec<PushDevice>> {
        let rows = sqlx::query("SELECT * FROM push_devices ORDER BY created_at ASC").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_device).collect()
    }

    async fn list_devices_for_user(&self, user_id: &str) -> DomainResult<Vec<PushDevice>> {
        let rows = sqlx::query("SELECT * FROM push_devices WHERE user_id = ? ORDER BY created_at ASC").bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_device).collect()
    }

    async fn delete_device_by_token(&self, token: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM push_devices WHERE token = ?").bind(token).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_preferences(&self, user_id: &str) -> DomainResult<Option<NotificationPreferences>> {
        let row = sqlx::query("SELECT * FROM notification_preferences WHERE user_id = ?").bind(user_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_preferences).transpose()
    }

    async fn upsert_preferences(&self, preferences: &NotificationPreferences) -> DomainResult<()> {
        let events_json = serde_json::to_string(&preferences.events)?;
        let quiet_hours_json = preferences.quiet_hours.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO notification_preferences (user_id, enabled, events, quiet_hours, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                enabled = excluded.enabled, events = excluded.events, quiet_hours = excluded.quiet_hours, updated_at = excluded.updated_at",
        )
        .bind(&preferences.user_id)
        .bind(i64::from(preferences.enabled))
        .bind(events_json)
        .bind(quiet_hours_json)
        .bind(preferences.created_at.to_rfc3339())
        .bind(preferences.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::event::EventType;

    async fn store() -> SqlitePushStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqlitePushStore::new(pool)
    }

    #[tokio::test]
    async fn register_device_twice_with_same_token_updates_in_place() {
        let store = store().await;
        store.register_device(&PushDevice::new("dev-1", "user-1", Platform::Ios, "token-abc")).await.unwrap();
        store.register_device(&PushDevice::new("dev-2", "user-2", Platform::Android, "token-abc")).await.unwrap();

        let devices = store.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].user_id, "user-2");
        assert_eq!(devices[0].platform, Platform::Android);
    }

    #[tokio::test]
    async fn delete_device_by_token_reports_whether_a_row_existed() {
        let store = store().await;
        store.register_device(&PushDevice::new("dev-1", "user-1", Platform::Ios, "token-abc")).await.unwrap();

        assert!(store.delete_device_by_token("token-abc").await.unwrap());
        assert!(!store.delete_device_by_token("token-abc").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_preferences_round_trips_quiet_hours() {
        let store = store().await;
        let mut prefs = NotificationPreferences::new("user-1");
        prefs.events = vec![EventType::HostStatusTransition];
        prefs.quiet_hours = Some(QuietHours { start_hour: 22, end_hour: 6, timezone: Some("America/New_York".into()) });
        store.upsert_preferences(&prefs).await.unwrap();

        let loaded = store.get_preferences("user-1").await.unwrap().unwrap();
        assert!(loaded.enabled);
        assert_eq!(loaded.events, vec![EventType::HostStatusTransition]);
        let quiet = loaded.quiet_hours.unwrap();
        assert_eq!(quiet.start_hour, 22);
        assert_eq!(quiet.timezone.as_deref(), Some("America/New_York"));
    }

    #[tokio::test]
    async fn get_preferences_returns_none_when_unset() {
        let store = store().await;
        assert!(store.get_preferences("stranger").await.unwrap().is_none());
    }
}
