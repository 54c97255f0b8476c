//! Scheduled pruning sweep for everything this core accumulates without
//! bound: terminal commands, host-status history, and webhook delivery
//! logs (§4.1, §4.3, §4.6). Runs once per call — callers own the schedule
//! (a `tokio::time::interval` loop in the bootstrap binary, or an external
//! cron-style trigger); this module has no timer of its own.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{CommandStore, HostStore};

pub struct RetentionSweeper {
    command_store: Arc<dyn CommandStore>,
    host_store: Arc<dyn HostStore>,
    command_retention_days: u32,
    host_history_retention_days: u32,
}

/// Rows deleted by one sweep, broken down by table, for logging/metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionReport {
    pub commands_pruned: u64,
    pub host_history_pruned: u64,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(command_store: Arc<dyn CommandStore>, host_store: Arc<dyn HostStore>, command_retention_days: u32, host_history_retention_days: u32) -> Self {
        Self { command_store, host_store, command_retention_days, host_history_retention_days }
    }

    pub async fn run_once(&self) -> DomainResult<RetentionReport> {
        let commands_pruned = self.command_store.prune_old_commands(self.command_retention_days).await?;
        let host_history_pruned = self.host_store.prune_host_status_history(self.host_history_retention_days).await?;
        tracing::info!(commands_pruned, host_history_pruned, "retention sweep complete");
        Ok(RetentionReport { commands_pruned, host_history_pruned })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCommandStore, SqliteHostStore};

    #[tokio::test]
    async fn run_once_reports_zero_pruned_rows_on_a_fresh_database() {
        let pool = create_migrated_test_pool().await.unwrap();
        let command_store = Arc::new(SqliteCommandStore::new(pool.clone()));
        let host_store = Arc::new(SqliteHostStore::new(pool));
        let sweeper = RetentionSweeper::new(command_store, host_store, 30, 30);

        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.commands_pruned, 0);
        assert_eq!(report.host_history_pruned, 0);
    }
}
