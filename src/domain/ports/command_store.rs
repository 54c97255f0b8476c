//! Durable command queue port (§4.1).

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::command::{Command, CommandType};

/// Persistence interface for `Command` records. Implementations must make
/// `enqueue` atomic against concurrent callers racing on the same
/// `(node_id, idempotency_key)` pair (§4.1, §8 idempotence properties).
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Insert a new `queued` row, or return the existing row unchanged if
    /// `idempotency_key` is `Some` and a row already exists for
    /// `(node_id, idempotency_key)`. Never produces two rows for the same key.
    async fn enqueue(&self, id: &str, node_id: &str, command_type: CommandType, payload: Value, idempotency_key: Option<&str>) -> DomainResult<Command>;

    /// `state ← sent`, `sent_at ← now`, `retry_count += 1`. Safe to call on
    /// an already-`sent` row (crash recovery re-dispatch).
    async fn mark_sent(&self, id: &str) -> DomainResult<()>;

    /// `state ← acknowledged`, `completed_at ← now`. Idempotent.
    async fn mark_acknowledged(&self, id: &str) -> DomainResult<()>;

    /// `state ← failed`, `error ← err`, `completed_at ← now`.
    async fn mark_failed(&self, id: &str, err: &str) -> DomainResult<()>;

    /// `state ← timed_out`, `error ← err`, `completed_at ← now`.
    async fn mark_timed_out(&self, id: &str, err: &str) -> DomainResult<()>;

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Command>>;

    async fn find_by_idempotency_key(&self, node_id: &str, key: &str) -> DomainResult<Option<Command>>;

    /// Rows `queued` for `node_id`, ordered by `created_at` ascending (§5
    /// ordering guarantees), capped at `limit`.
    async fn list_queued_by_node(&self, node_id: &str, limit: u32) -> DomainResult<Vec<Command>>;

    /// Observability listing, optionally scoped to one node.
    async fn list_recent(&self, limit: u32, node_id: Option<&str>) -> DomainResult<Vec<Command>>;

    /// On startup, transition any row still `sent` whose `created_at` is
    /// older than `timeout_ms` to `timed_out`. Rows `queued` are left alone.
    /// Returns the number of rows transitioned.
    async fn reconcile_stale_in_flight(&self, timeout_ms: u64) -> DomainResult<u64>;

    /// Delete rows older than `retention_days`. Called by the daily
    /// retention sweep (`services::retention`).
    async fn prune_old_commands(&self, retention_days: u32) -> DomainResult<u64>;
}
