//! SQLite implementation of `WebhookStore`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::event::EventType;
use crate::domain::models::webhook::{DeliveryStatus, WebhookDeliveryLog, WebhookTarget};
use crate::domain::ports::WebhookStore;

use super::parse_datetime;

#[derive(Clone)]
pub struct SqliteWebhookStore {
    pool: SqlitePool,
}

impl SqliteWebhookStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_target(row: &sqlx::sqlite::SqliteRow) -> DomainResult<WebhookTarget> {
        let events_raw: String = row.try_get("events")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(WebhookTarget {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            events: serde_json::from_str(&events_raw)?,
            secret: row.try_get("secret")?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn row_to_delivery(row: &sqlx::sqlite::SqliteRow) -> DomainResult<WebhookDeliveryLog> {
        let event_type: String = row.try_get("event_type")?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;
        let payload_raw: String = row.try_get("payload")?;
        let response_status: Option<i64> = row.try_get("response_status")?;
        Ok(WebhookDeliveryLog {
            id: row.try_get("id")?,
            webhook_id: row.try_get("webhook_id")?,
            event_type: EventType::from_str(&event_type)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored event type {event_type:?}")))?,
            attempt: row.try_get::<i64, _>("attempt")? as u32,
            status: match status.as_str() {
                "success" => DeliveryStatus::Success,
                "failure" => DeliveryStatus::Failure,
                other => return Err(DomainError::ValidationFailed(format!("unknown stored delivery status {other:?}"))),
            },
            response_status: response_status.map(|s| s as u16),
            error: row.try_get("error")?,
            payload: serde_json::from_str(&payload_raw)?,
            created_at: parse_datetime(&created_at)?,
        })
    }
}

#[async_trait]
impl WebhookStore for SqliteWebhookStore {
    async fn create(&self, target: &WebhookTarget) -> DomainResult<()> {
        let events_json = serde_json::to_string(&target.events)?;
        sqlx::query("INSERT INTO webhooks (id, url, events, secret, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(&target.id)
            .bind(&target.url)
            .bind(events_json)
            .bind(&target.secret)
            .bind(target.created_at.to_rfc3339())
            .bind(target.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> DomainResult<Vec<WebhookTarget>> {
        let rows = sqlx::query("SELECT * FROM webhooks ORDER BY created_at ASC").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_target).collect()
    }

    async fn list_targets_by_event(&self, event_type: EventType) -> DomainResult<Vec<WebhookTarget>> {
        // `events` is stored as a JSON array; filter in Rust rather than
        // leaning on SQLite's JSON1 functions, matching the grep-style
        // predicate the domain model already exposes via `subscribes_to`.
        let all = self.list_all().await?;
        Ok(all.into_iter().filter(|t| t.subscribes_to(event_type)).collect())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<WebhookTarget>> {
        let row = sqlx::query("SELECT * FROM webhooks WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_target).transpose()
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM webhooks WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn append_delivery_log(&self, log: &WebhookDeliveryLog) -> DomainResult<()> {
        let payload_json = serde_json::to_string(&log.payload)?;
        sqlx::query(
            "INSERT INTO webhook_delivery_logs (id, webhook_id, event_type, attempt, status, response_status, error, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(&log.webhook_id)
        .bind(log.event_type.as_str())
        .bind(i64::from(log.attempt))
        .bind(log.status.as_str())
        .bind(log.response_status.map(i64::from))
        .bind(&log.error)
        .bind(payload_json)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_deliveries(&self, webhook_id: &str, limit: u32) -> DomainResult<Vec<WebhookDeliveryLog>> {
        let rows = sqlx::query("SELECT * FROM webhook_delivery_logs WHERE webhook_id = ? ORDER BY created_at DESC LIMIT ?")
            .bind(webhook_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_delivery).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn store() -> SqliteWebhookStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteWebhookStore::new(pool)
    }

    #[tokio::test]
    async fn create_then_list_targets_by_event_filters_subscriptions() {
        let store = store().await;
        store.create(&WebhookTarget::new("wh-1", "https://a.example/hook", vec![EventType::HostStatusTransition], Some("s3cr3t".into()))).await.unwrap();
        store.create(&WebhookTarget::new("wh-2", "https://b.example/hook", vec![EventType::ScanComplete], None)).await.unwrap();

        let subscribed = store.list_targets_by_event(EventType::HostStatusTransition).await.unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].id, "wh-1");
    }

    #[tokio::test]
    async fn deleting_webhook_cascades_delivery_logs() {
        let store = store().await;
        store.create(&WebhookTarget::new("wh-1", "https://a.example/hook", vec![EventType::ScanComplete], None)).await.unwrap();
        store
            .append_delivery_log(&WebhookDeliveryLog::new("log-1", "wh-1", EventType::ScanComplete, 1, DeliveryStatus::Success, Some(200), None, json!({})))
            .await
            .unwrap();

        store.delete("wh-1").await.unwrap();

        let deliveries = store.list_deliveries("wh-1", 10).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn list_deliveries_orders_most_recent_first() {
        let store = store().await;
        store.create(&WebhookTarget::new("wh-1", "https://a.example/hook", vec![EventType::ScanComplete], None)).await.unwrap();
        store
            .append_delivery_log(&WebhookDeliveryLog::new("log-1", "wh-1", EventType::ScanComplete, 1, DeliveryStatus::Failure, Some(500), Some("boom".into()), json!({})))
            .await
            .unwrap();
        store
            .append_delivery_log(&WebhookDeliveryLog::new("log-2", "wh-1", EventType::ScanComplete, 2, DeliveryStatus::Success, Some(200), None, json!({})))
            .await
            .unwrap();

        let deliveries = store.list_deliveries("wh-1", 10).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].id, "log-2");
    }
}
