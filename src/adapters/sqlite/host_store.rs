//! SQLite implementation of `HostStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::host::{AggregatedHost, HostStatus, HostStatusHistoryEntry};
use crate::domain::ports::{HostStats, HostStore};

use super::parse_datetime;

#[derive(Clone)]
pub struct SqliteHostStore {
    pool: SqlitePool,
}

impl SqliteHostStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_host(row: &sqlx::sqlite::SqliteRow) -> DomainResult<AggregatedHost> {
        let status: String = row.try_get("status")?;
        let secondary_macs_raw: String = row.try_get("secondary_macs")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        let last_seen: String = row.try_get("last_seen")?;
        let wol_port: Option<i64> = row.try_get("wol_port")?;
        let discovered: Option<i64> = row.try_get("discovered")?;
        let ping_responsive: Option<i64> = row.try_get("ping_responsive")?;

        Ok(AggregatedHost {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            name: row.try_get("name")?,
            mac: row.try_get("mac")?,
            secondary_macs: serde_json::from_str(&secondary_macs_raw)?,
            ip: row.try_get("ip")?,
            wol_port: wol_port.map(|p| p as u16),
            status: HostStatus::from_str(&status)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored host status {status:?}")))?,
            location: row.try_get("location")?,
            fully_qualified_name: row.try_get("fully_qualified_name")?,
            discovered: discovered.map(|d| d != 0),
            ping_responsive: ping_responsive.map(|p| p != 0),
            last_seen: parse_datetime(&last_seen)?,
            created_at: parse_datetime(&created_at)?,
            updated_at: parse_datetime(&updated_at)?,
        })
    }

    fn row_to_history_entry(row: &sqlx::sqlite::SqliteRow) -> DomainResult<HostStatusHistoryEntry> {
        let old_status: String = row.try_get("old_status")?;
        let new_status: String = row.try_get("new_status")?;
        let changed_at: String = row.try_get("changed_at")?;
        Ok(HostStatusHistoryEntry {
            host_fqn: row.try_get("host_fqn")?,
            old_status: HostStatus::from_str(&old_status)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored host status {old_status:?}")))?,
            new_status: HostStatus::from_str(&new_status)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown stored host status {new_status:?}")))?,
            changed_at: parse_datetime(&changed_at)?,
        })
    }

    async fn find_one(&self, query: &str, binds: &[&str]) -> DomainResult<Option<AggregatedHost>> {
        let mut q = sqlx::query(query);
        for b in binds {
            q = q.bind(*b);
        }
        let row = q.fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_host).transpose()
    }
}

#[async_trait]
impl HostStore for SqliteHostStore {
    async fn find_by_node_and_mac(&self, node_id: &str, mac: &str) -> DomainResult<Option<AggregatedHost>> {
        self.find_one("SELECT * FROM aggregated_hosts WHERE node_id = ? AND mac = ?", &[node_id, mac]).await
    }

    async fn find_by_node_and_name(&self, node_id: &str, name: &str) -> DomainResult<Option<AggregatedHost>> {
        self.find_one("SELECT * FROM aggregated_hosts WHERE node_id = ? AND name = ?", &[node_id, name]).await
    }

    async fn find_by_fqn(&self, fqn: &str) -> DomainResult<Option<AggregatedHost>> {
        self.find_one("SELECT * FROM aggregated_hosts WHERE fully_qualified_name = ?", &[fqn]).await
    }

    async fn insert(&self, host: &AggregatedHost) -> DomainResult<()> {
        let secondary_macs_json = serde_json::to_string(&host.secondary_macs)?;
        sqlx::query(
            "INSERT INTO aggregated_hosts
             (id, node_id, name, mac, secondary_macs, ip, wol_port, status, location, fully_qualified_name, discovered, ping_responsive, last_seen, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&host.id)
        .bind(&host.node_id)
        .bind(&host.name)
        .bind(&host.mac)
        .bind(secondary_macs_json)
        .bind(&host.ip)
        .bind(host.wol_port.map(i64::from))
        .bind(host.status.as_str())
        .bind(&host.location)
        .bind(&host.fully_qualified_name)
        .bind(host.discovered.map(i64::from))
        .bind(host.ping_responsive.map(i64::from))
        .bind(host.last_seen.to_rfc3339())
        .bind(host.created_at.to_rfc3339())
        .bind(host.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, host: &AggregatedHost) -> DomainResult<()> {
        let secondary_macs_json = serde_json::to_string(&host.secondary_macs)?;
        sqlx::query(
            "UPDATE aggregated_hosts SET
                name = ?, mac = ?, secondary_macs = ?, ip = ?, wol_port = ?, status = ?, location = ?,
                fully_qualified_name = ?, discovered = ?, ping_responsive = ?, last_seen = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&host.name)
        .bind(&host.mac)
        .bind(secondary_macs_json)
        .bind(&host.ip)
        .bind(host.wol_port.map(i64::from))
        .bind(host.status.as_str())
        .bind(&host.location)
        .bind(&host.fully_qualified_name)
        .bind(host.discovered.map(i64::from))
        .bind(host.ping_responsive.map(i64::from))
        .bind(host.last_seen.to_rfc3339())
        .bind(host.updated_at.to_rfc3339())
        .bind(&host.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM aggregated_hosts WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_by_node_and_name(&self, node_id: &str, name: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM aggregated_hosts WHERE node_id = ? AND name = ?").bind(node_id).bind(name).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_other_rows_with_mac(&self, node_id: &str, mac: &str, keep_id: &str) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM aggregated_hosts WHERE node_id = ? AND mac = ? AND id != ?")
            .bind(node_id)
            .bind(mac)
            .bind(keep_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_all_hosts(&self) -> DomainResult<Vec<AggregatedHost>> {
        let rows = sqlx::query("SELECT * FROM aggregated_hosts ORDER BY fully_qualified_name ASC").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_host).collect()
    }

    async fn get_hosts_by_node(&self, node_id: &str) -> DomainResult<Vec<AggregatedHost>> {
        let rows = sqlx::query("SELECT * FROM aggregated_hosts WHERE node_id = ? ORDER BY name ASC").bind(node_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_host).collect()
    }

    async fn mark_node_hosts_unreachable(&self, node_id: &str) -> DomainResult<u64> {
        let mut tx = self.pool.begin().await?;
        let awake_rows = sqlx::query("SELECT fully_qualified_name FROM aggregated_hosts WHERE node_id = ? AND status = 'awake'")
            .bind(node_id)
            .fetch_all(&mut *tx)
            .await?;

        if awake_rows.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let now = Utc::now();
        sqlx::query("UPDATE aggregated_hosts SET status = 'asleep', updated_at = ? WHERE node_id = ? AND status = 'awake'")
            .bind(now.to_rfc3339())
            .bind(node_id)
            .execute(&mut *tx)
            .await?;

        for row in &awake_rows {
            let fqn: String = row.try_get("fully_qualified_name")?;
            sqlx::query("INSERT INTO host_status_history (id, host_fqn, old_status, new_status, changed_at) VALUES (?, ?, 'awake', 'asleep', ?)")
                .bind(Uuid::new_v4().to_string())
                .bind(fqn)
                .bind(now.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(awake_rows.len() as u64)
    }

    async fn remove_node_hosts(&self, node_id: &str) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM aggregated_hosts WHERE node_id = ?").bind(node_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn append_status_history(&self, entry: &HostStatusHistoryEntry) -> DomainResult<()> {
        sqlx::query("INSERT INTO host_status_history (id, host_fqn, old_status, new_status, changed_at) VALUES (?, ?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(&entry.host_fqn)
            .bind(entry.old_status.as_str())
            .bind(entry.new_status.as_str())
            .bind(entry.changed_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_host_status_history(&self, fqn: &str, since: DateTime<Utc>) -> DomainResult<Vec<HostStatusHistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM host_status_history WHERE host_fqn = ? AND changed_at >= ? ORDER BY changed_at ASC")
            .bind(fqn)
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_history_entry).collect()
    }

    async fn get_stats(&self) -> DomainResult<HostStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    SUM(CASE WHEN status = 'awake' THEN 1 ELSE 0 END) AS awake,
                    SUM(CASE WHEN status = 'asleep' THEN 1 ELSE 0 END) AS asleep
             FROM aggregated_hosts",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(HostStats {
            total_hosts: row.try_get::<i64, _>("total")? as u64,
            awake_hosts: row.try_get::<Option<i64>, _>("awake")?.unwrap_or(0) as u64,
            asleep_hosts: row.try_get::<Option<i64>, _>("asleep")?.unwrap_or(0) as u64,
        })
    }

    async fn prune_host_status_history(&self, retention_days: u32) -> DomainResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let result = sqlx::query("DELETE FROM host_status_history WHERE changed_at < ?").bind(cutoff.to_rfc3339()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn store() -> SqliteHostStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteHostStore::new(pool)
    }

    fn sample_host() -> AggregatedHost {
        AggregatedHost::new("host-1", "node-1", "pc-a", "aa:bb:cc:dd:ee:ff", Some("10.0.0.5".into()), None, "lab")
    }

    #[tokio::test]
    async fn insert_then_find_by_node_and_mac_round_trips() {
        let store = store().await;
        let host = sample_host();
        store.insert(&host).await.unwrap();

        let found = store.find_by_node_and_mac("node-1", "aa:bb:cc:dd:ee:ff").await.unwrap().unwrap();
        assert_eq!(found.id, "host-1");
        assert_eq!(found.fully_qualified_name, "pc-a@lab-node-1");
    }

    #[tokio::test]
    async fn mark_node_hosts_unreachable_flips_status_and_logs_history() {
        let store = store().await;
        store.insert(&sample_host()).await.unwrap();

        let flipped = store.mark_node_hosts_unreachable("node-1").await.unwrap();
        assert_eq!(flipped, 1);

        let host = store.find_by_node_and_mac("node-1", "aa:bb:cc:dd:ee:ff").await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Asleep);

        let history = store.get_host_status_history("pc-a@lab-node-1", Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, HostStatus::Awake);
        assert_eq!(history[0].new_status, HostStatus::Asleep);
    }

    #[tokio::test]
    async fn mark_node_hosts_unreachable_is_noop_when_already_asleep() {
        let store = store().await;
        store.insert(&sample_host()).await.unwrap();
        store.mark_node_hosts_unreachable("node-1").await.unwrap();

        let flipped_again = store.mark_node_hosts_unreachable("node-1").await.unwrap();
        assert_eq!(flipped_again, 0);
    }

    #[tokio::test]
    async fn delete_other_rows_with_mac_keeps_only_the_named_row() {
        let store = store().await;
        let mut dup = sample_host();
        dup.id = "host-2".to_string();
        dup.name = "pc-a-dup".to_string();
        dup.refresh_fqn();

        store.insert(&sample_host()).await.unwrap();
        store.insert(&dup).await.unwrap();

        let deleted = store.delete_other_rows_with_mac("node-1", "aa:bb:cc:dd:ee:ff", "host-1").await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.get_hosts_by_node("node-1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "host-1");
    }

    #[tokio::test]
    async fn get_stats_counts_by_status() {
        let store = store().await;
        store.insert(&sample_host()).await.unwrap();
        let mut second = sample_host();
        second.id = "host-2".to_string();
        second.mac = "11:22:33:44:55:66".to_string();
        second.name = "pc-b".to_string();
        second.refresh_fqn();
        second.status = HostStatus::Asleep;
        store.insert(&second).await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_hosts, 2);
        assert_eq!(stats.awake_hosts, 1);
        assert_eq!(stats.asleep_hosts, 1);
    }
}
