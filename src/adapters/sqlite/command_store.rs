//! SQLite implementation of `CommandStore`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::command::{Command, CommandState, CommandType};
use crate::domain::ports::CommandStore;

use super::parse_datetime;

#[derive(Clone)]
pub struct SqliteCommandStore {
    pool: SqlitePool,
}

impl SqliteCommandStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_command(row: &sqlx::sqlite::SqliteRow) -> DomainResult<Command> {
        let command_type: String = row.try_get("type")?;
        let state: String = row.try_get("state")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let sent_at: Option<String> = row.try_get("sent_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;
        let payload_raw: String = row.try_get("payload")?;

        Ok(Command {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            command_type: CommandType::from_str(&command_type)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored command type {command_type:?}")))?,
            payload: serde_json::from_str(&payload_raw)?,
            idempotency_key: row.try_get("idempotency_key")?,
            state: CommandState::from_str(&state)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored command state {state:?}")))?,
            error: row.try_get("error")?,
            retry_count: row.try_get::<i64, _>("retry_count")? as u32,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
            sent_at: sent_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }

    async fn fetch_one_command(&self, id: &str) -> DomainResult<Option<Command>> {
        let row = sqlx::query("SELECT * FROM commands WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_command).transpose()
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation)
    }
}

#[async_trait]
impl CommandStore for SqliteCommandStore {
    async fn enqueue(&self, id: &str, node_id: &str, command_type: CommandType, payload: Value, idempotency_key: Option<&str>) -> DomainResult<Command> {
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(node_id, key).await? {
                return Ok(existing);
            }
        }

        let command = Command::new(id, node_id, command_type, payload, idempotency_key.map(str::to_string));
        let payload_json = serde_json::to_string(&command.payload)?;

        let insert_result = sqlx::query(
            "INSERT INTO commands (id, node_id, type, payload, idempotency_key, state, error, retry_count, created_at, updated_at, sent_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&command.id)
        .bind(&command.node_id)
        .bind(command.command_type.as_str())
        .bind(&payload_json)
        .bind(&command.idempotency_key)
        .bind(command.state.as_str())
        .bind(&command.error)
        .bind(i64::from(command.retry_count))
        .bind(command.created_at.to_rfc3339())
        .bind(command.updated_at.to_rfc3339())
        .bind(command.sent_at.map(|t| t.to_rfc3339()))
        .bind(command.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match insert_result {
            Ok(_) => Ok(command),
            Err(err) if Self::is_unique_violation(&err) => {
                // Lost a race against a concurrent enqueue for the same
                // (node_id, idempotency_key); the winner's row is authoritative.
                if let Some(key) = idempotency_key {
                    if let Some(existing) = self.find_by_idempotency_key(node_id, key).await? {
                        return Ok(existing);
                    }
                }
                Err(DomainError::Persistence(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn mark_sent(&self, id: &str) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE commands SET state = 'sent', sent_at = ?, updated_at = ?, retry_count = retry_count + 1 WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_acknowledged(&self, id: &str) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE commands SET state = 'acknowledged', completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, err: &str) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE commands SET state = 'failed', error = ?, completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(err)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_timed_out(&self, id: &str, err: &str) -> DomainResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE commands SET state = 'timed_out', error = ?, completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(err)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Command>> {
        self.fetch_one_command(id).await
    }

    async fn find_by_idempotency_key(&self, node_id: &str, key: &str) -> DomainResult<Option<Command>> {
        let row = sqlx::query("SELECT * FROM commands WHERE node_id = ? AND idempotency_key = ?")
            .bind(node_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_command).transpose()
    }

    async fn list_queued_by_node(&self, node_id: &str, limit: u32) -> DomainResult<Vec<Command>> {
        let rows = sqlx::query("SELECT * FROM commands WHERE node_id = ? AND state = 'queued' ORDER BY created_at ASC LIMIT ?")
            .bind(node_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_command).collect()
    }

    async fn list_recent(&self, limit: u32, node_id: Option<&str>) -> DomainResult<Vec<Command>> {
        let rows = if let Some(node_id) = node_id {
            sqlx::query("SELECT * FROM commands WHERE node_id = ? ORDER BY created_at DESC LIMIT ?")
                .bind(node_id)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT * FROM commands ORDER BY created_at DESC LIMIT ?").bind(i64::from(limit)).fetch_all(&self.pool).await?
        };
        rows.iter().map(Self::row_to_command).collect()
    }

    async fn reconcile_stale_in_flight(&self, timeout_ms: u64) -> DomainResult<u64> {
        let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(timeout_ms as i64);
        let result = sqlx::query(
            "UPDATE commands SET state = 'timed_out', error = 'stale in-flight command reconciled on startup', completed_at = ?, updated_at = ?
             WHERE state = 'sent' AND created_at < ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_old_commands(&self, retention_days: u32) -> DomainResult<u64> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let result = sqlx::query("DELETE FROM commands WHERE created_at < ?").bind(cutoff.to_rfc3339()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn store() -> SqliteCommandStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteCommandStore::new(pool)
    }

    #[tokio::test]
    async fn enqueue_twice_with_same_idempotency_key_returns_same_row() {
        let store = store().await;
        let first = store.enqueue("cmd-1", "node-1", CommandType::Wake, json!({"hostName": "pc-a"}), Some("op-42")).await.unwrap();
        let second = store.enqueue("cmd-2", "node-1", CommandType::Wake, json!({"hostName": "pc-a"}), Some("op-42")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, "cmd-1");

        let recent = store.list_recent(10, Some("node-1")).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn mark_sent_increments_retry_count_each_call() {
        let store = store().await;
        store.enqueue("cmd-1", "node-1", CommandType::Wake, json!({}), None).await.unwrap();
        store.mark_sent("cmd-1").await.unwrap();
        store.mark_sent("cmd-1").await.unwrap();
        let command = store.find_by_id("cmd-1").await.unwrap().unwrap();
        assert_eq!(command.retry_count, 2);
        assert!(command.sent_at.is_some());
    }

    #[tokio::test]
    async fn list_queued_by_node_orders_by_created_at_ascending() {
        let store = store().await;
        store.enqueue("cmd-1", "node-1", CommandType::PingHost, json!({}), None).await.unwrap();
        store.enqueue("cmd-2", "node-1", CommandType::PingHost, json!({}), None).await.unwrap();
        let queued = store.list_queued_by_node("node-1", 10).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, "cmd-1");
        assert_eq!(queued[1].id, "cmd-2");
    }

    #[tokio::test]
    async fn reconcile_stale_in_flight_only_touches_sent_rows() {
        let store = store().await;
        store.enqueue("cmd-1", "node-1", CommandType::Wake, json!({}), None).await.unwrap();
        store.mark_sent("cmd-1").await.unwrap();
        sqlx::query("UPDATE commands SET created_at = ? WHERE id = 'cmd-1'")
            .bind((chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();

        store.enqueue("cmd-2", "node-1", CommandType::Wake, json!({}), None).await.unwrap();

        let reconciled = store.reconcile_stale_in_flight(1_000).await.unwrap();
        assert_eq!(reconciled, 1);

        let cmd1 = store.find_by_id("cmd-1").await.unwrap().unwrap();
        assert_eq!(cmd1.state, CommandState::TimedOut);
        let cmd2 = store.find_by_id("cmd-2").await.unwrap().unwrap();
        assert_eq!(cmd2.state, CommandState::Queued);
    }
}
