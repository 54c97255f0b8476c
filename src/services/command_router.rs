//! Dispatches commands to node agents and tracks them to completion (§4.2).
//!
//! The pipeline per command is a single atomic call: enqueue
//! (idempotency-scoped) → fast-path a terminal replay → short-circuit queued
//! offline commands that don't require a live node → register this caller as
//! a waiter on the command id (joining an in-flight dispatch if one already
//! exists) → dispatch if still queued → await the `command-result` with a
//! bounded timeout. A reconnect flush re-sends every still-`queued` row for
//! a node the moment it comes back online (§4.2.4), applying the same
//! backoff used for retries and expiring anything that's aged out of the
//! offline queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::command::{scope_idempotency_key, Command, CommandState, CommandType};
use crate::domain::models::host::AggregatedHost;
use crate::domain::ports::node_registry::CommandResult as NodeCommandResult;
use crate::domain::ports::{CommandStore, NodeRegistry};
use crate::services::host_aggregator::HostAggregator;

/// Tuning knobs pulled from `CommandConfig` (kept separate from the config
/// model itself so this module has no dependency on `figment`/serde).
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    pub command_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Age beyond which a still-`queued` row is failed during reconnect
    /// flush rather than re-dispatched (§4.2.4).
    pub offline_command_ttl_ms: u64,
}

/// What a `route_*` call resolves to once `execute_command` returns.
#[derive(Debug, Clone)]
enum CommandOutcome {
    /// Enqueued but never dispatched — the node was offline and the command
    /// type doesn't require a live connection. No waiter was registered.
    Queued(Command),
    /// A `command-result` arrived (or the row was already `acknowledged`
    /// from a prior call sharing the same idempotency key, in which case
    /// `result` is `None`).
    Completed { command: Command, result: Option<NodeCommandResult> },
}

/// What a waiter's `oneshot` resolves to. Distinct from `DomainError` because
/// it must be cloned out to every waiter sharing a pending entry, and
/// `DomainError` can't derive `Clone` (it wraps `sqlx::Error`).
#[derive(Debug, Clone)]
enum WaiterOutcome {
    Result(NodeCommandResult),
    Failed(String),
    TimedOut(String),
}

/// One in-flight command's waiter list (§3 "Pending command entry", §9).
/// Every `route_*` call racing on the same command id appends here instead
/// of replacing a prior entry, so they all observe the same resolution.
struct PendingEntry {
    waiters: Vec<oneshot::Sender<WaiterOutcome>>,
}

/// Operator-facing response for `wake` (§4.2.6, §8 scenario 1/2).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeResponse {
    pub success: bool,
    pub message: String,
    pub node_id: String,
    pub location: String,
}

/// Operator-facing response shared by `ping-host`, `sleep-host`,
/// `shutdown-host`, `scan-host-ports`, `update-host`, and `delete-host`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCommandResponse {
    pub success: bool,
    pub message: String,
    pub node_id: String,
    pub host_name: String,
}

/// Per-node outcome inside a `scan` fan-out response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeScanResult {
    pub node_id: String,
    pub success: bool,
    pub message: String,
}

/// Aggregated response for a `scan` broadcast across every connected node
/// (§4.2.6).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub state: String,
    pub queued_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub last_scan_at: Option<chrono::DateTime<Utc>>,
    pub node_results: Vec<NodeScanResult>,
}

pub struct CommandRouter {
    command_store: Arc<dyn CommandStore>,
    node_registry: Arc<dyn NodeRegistry>,
    host_aggregator: Arc<HostAggregator>,
    config: RouterConfig,
    pending: Arc<AsyncMutex<HashMap<String, PendingEntry>>>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(command_store: Arc<dyn CommandStore>, node_registry: Arc<dyn NodeRegistry>, host_aggregator: Arc<HostAggregator>, config: RouterConfig) -> Self {
        Self {
            command_store,
            node_registry,
            host_aggregator,
            config,
            pending: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    /// Exponential backoff with jitter, capped at half the command timeout
    /// (§4.2.3): `min(baseDelay * 2^(retryCount-1) + jitter, commandTimeout / 2)`.
    #[must_use]
    pub fn calculate_backoff_delay(&self, retry_count: u32) -> u64 {
        let exponent = retry_count.saturating_sub(1).min(20);
        let base = self.config.retry_base_delay_ms.saturating_mul(1_u64 << exponent);
        let jitter_bound = (base / 4).max(1);
        let jitter = rand::thread_rng().gen_range(0..=jitter_bound);
        (base + jitter).min(self.config.command_timeout_ms / 2)
    }

    fn build_wire_message(command: &Command) -> Value {
        json!({
            "type": "command",
            "id": command.id,
            "commandType": command.command_type.as_str(),
            "payload": command.payload,
        })
    }

    async fn send_now(&self, command: &mut Command) -> DomainResult<()> {
        let wire_msg = Self::build_wire_message(command);
        self.node_registry.send_command(&command.node_id, &wire_msg)?;
        self.command_store.mark_sent(&command.id).await?;
        Ok(())
    }

    /// Append a waiter to `command_id`'s pending entry, creating one if this
    /// is the first caller to register on it. Returns whether the entry was
    /// newly created, so the caller knows whether it owns the timeout watchdog.
    async fn register_waiter(&self, command_id: &str) -> (oneshot::Receiver<WaiterOutcome>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        if let Some(entry) = pending.get_mut(command_id) {
            entry.waiters.push(tx);
            (rx, false)
        } else {
            pending.insert(command_id.to_string(), PendingEntry { waiters: vec![tx] });
            (rx, true)
        }
    }

    async fn reject_pending(&self, command_id: &str, outcome: WaiterOutcome) {
        if let Some(entry) = self.pending.lock().await.remove(command_id) {
            for waiter in entry.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Own the single timeout for a pending entry (§4.2.5, §9: one timeout
    /// handle per command id, not one per waiter). Fires only if nobody
    /// resolved or re-registered the entry first.
    fn spawn_timeout_watchdog(&self, command_id: String, attempt: u32) {
        let pending = self.pending.clone();
        let command_store = self.command_store.clone();
        let timeout_ms = self.config.command_timeout_ms;
        let max_retries = self.config.max_retries;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            let Some(entry) = pending.lock().await.remove(&command_id) else {
                return;
            };
            let message = format!("Command {command_id} timed out after {timeout_ms}ms (attempt {attempt}/{max_retries})");
            let _ = command_store.mark_timed_out(&command_id, &message).await;
            for waiter in entry.waiters {
                let _ = waiter.send(WaiterOutcome::TimedOut(message.clone()));
            }
        });
    }

    /// Deliver an inbound `command-result` to every waiter registered on it
    /// (§4.2.2, §8: racing callers on the same command id "both resolve with
    /// the same result"). Persists the terminal state exactly once, here,
    /// regardless of how many waiters joined. A result with no registered
    /// entry (the timeout already fired, or nothing ever awaited it) is
    /// dropped silently.
    pub async fn complete_with_result(&self, result: NodeCommandResult) {
        let Some(entry) = self.pending.lock().await.remove(&result.command_id) else {
            return;
        };
        if result.success {
            let _ = self.command_store.mark_acknowledged(&result.command_id).await;
        } else {
            let err = result.error.clone().unwrap_or_else(|| "node reported failure".to_string());
            let _ = self.command_store.mark_failed(&result.command_id, &err).await;
        }
        for waiter in entry.waiters {
            let _ = waiter.send(WaiterOutcome::Result(result.clone()));
        }
    }

    /// The single `executeCommand` pipeline every `route_*` method drives
    /// (§4.2 steps 1-6). Idempotent: a second call sharing the same scoped
    /// idempotency key joins the same pending entry (or sees the same
    /// terminal row) instead of dispatching a duplicate command.
    async fn execute_command(&self, node_id: &str, command_type: CommandType, payload: Value, idempotency_key: Option<&str>) -> DomainResult<CommandOutcome> {
        let scoped_key = idempotency_key.map(|k| scope_idempotency_key(command_type, k));
        let mut command = self.command_store.enqueue(&Uuid::new_v4().to_string(), node_id, command_type, payload, scoped_key.as_deref()).await?;

        if command.state.is_terminal() {
            return match command.state {
                CommandState::Acknowledged => Ok(CommandOutcome::Completed { command, result: None }),
                CommandState::TimedOut => Err(DomainError::Timeout(command.error.take().unwrap_or_else(|| "command previously timed out".to_string()))),
                _ => Err(DomainError::ExecutionFailed(command.error.take().unwrap_or_else(|| "command previously failed".to_string()))),
            };
        }

        if command.state == CommandState::Queued && !self.node_registry.is_node_connected(node_id) {
            if command_type.requires_online_node() {
                let err = format!("node {node_id} is offline; {} requires a live connection", command_type.as_str());
                self.command_store.mark_failed(&command.id, &err).await?;
                return Err(DomainError::PreconditionFailed(err));
            }
            return Ok(CommandOutcome::Queued(command));
        }

        let (rx, is_new) = self.register_waiter(&command.id).await;

        // Only the caller that created the pending entry actually dispatches
        // — a second caller racing on the same (deduped) command id joins
        // the first one's in-flight send instead of sending it again.
        if is_new {
            if command.state == CommandState::Queued {
                let attempt = command.retry_count + 1;
                if let Err(err) = self.send_now(&mut command).await {
                    let msg = err.to_string();
                    let _ = self.command_store.mark_failed(&command.id, &msg).await;
                    self.reject_pending(&command.id, WaiterOutcome::Failed(msg)).await;
                    return Err(err);
                }
                self.spawn_timeout_watchdog(command.id.clone(), attempt);
            } else {
                self.spawn_timeout_watchdog(command.id.clone(), command.retry_count.max(1));
            }
        }

        match rx.await {
            Ok(WaiterOutcome::Result(result)) => {
                if result.success {
                    Ok(CommandOutcome::Completed { command, result: Some(result) })
                } else {
                    let err = result.error.clone().unwrap_or_else(|| "node reported failure".to_string());
                    Err(DomainError::ExecutionFailed(err))
                }
            }
            Ok(WaiterOutcome::Failed(err)) => Err(DomainError::Transport(err)),
            Ok(WaiterOutcome::TimedOut(err)) => Err(DomainError::Timeout(err)),
            Err(_recv_error) => Err(DomainError::Timeout("result channel closed before a command-result arrived".to_string())),
        }
    }

    /// Re-send every `queued` command for a node the moment it reconnects,
    /// so already-enqueued work doesn't sit idle until its own timeout
    /// (§4.2.4, §5). Rows older than `offline_command_ttl_ms` are expired
    /// instead of re-dispatched; rows with a prior attempt wait out the same
    /// jittered backoff a retry would.
    pub async fn flush_on_reconnect(&self, node_id: &str) -> DomainResult<u64> {
        let queued = self.command_store.list_queued_by_node(node_id, 500).await?;
        let mut flushed = 0;
        let now = Utc::now();

        for mut command in queued {
            let age_ms = u64::try_from((now - command.created_at).num_milliseconds().max(0)).unwrap_or(u64::MAX);
            if age_ms >= self.config.offline_command_ttl_ms {
                let _ = self.command_store.mark_failed(&command.id, "Command expired in offline queue").await;
                continue;
            }

            if self.pending.lock().await.contains_key(&command.id) {
                continue;
            }

            if command.retry_count > 0 {
                let delay = self.calculate_backoff_delay(command.retry_count);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let attempt = command.retry_count + 1;
            self.pending.lock().await.insert(command.id.clone(), PendingEntry { waiters: Vec::new() });
            self.spawn_timeout_watchdog(command.id.clone(), attempt);

            if self.send_now(&mut command).await.is_ok() {
                flushed += 1;
            } else {
                self.reject_pending(&command.id, WaiterOutcome::Failed("dispatch failed during reconnect flush".to_string())).await;
            }
        }
        Ok(flushed)
    }

    /// Register this router so `flush_on_reconnect` fires automatically
    /// whenever `NodeRegistry` reports a node coming online (§4.2.4
    /// "Subscribes to `node-connected`"). Returns the subscription token.
    pub fn attach_to_registry(self: &Arc<Self>) -> u64 {
        let router = Arc::clone(self);
        self.node_registry.subscribe(Arc::new(move |event| {
            if let crate::domain::ports::NodeEvent::Connected { node_id } = event {
                let router = router.clone();
                tokio::spawn(async move {
                    if let Err(err) = router.flush_on_reconnect(&node_id).await {
                        tracing::error!(%err, %node_id, "reconnect flush failed");
                    }
                });
            }
        }))
    }

    /// Run once on startup: any row left `sent` from a prior process is
    /// assumed lost and transitioned to `timed_out` (§4.2, crash recovery).
    pub async fn reconcile_stale_in_flight(&self) -> DomainResult<u64> {
        self.command_store.reconcile_stale_in_flight(self.config.command_timeout_ms).await
    }

    // -----------------------------------------------------------------
    // Route operations (§4.2.6)
    // -----------------------------------------------------------------

    pub async fn route_wake(&self, fqn: &str, wol_port: Option<u16>, verify: bool, idempotency_key: Option<&str>) -> DomainResult<WakeResponse> {
        let host = self.resolve_host(fqn).await?;
        let payload = json!({ "hostName": host.name, "mac": host.mac, "wolPort": wol_port, "verify": verify });
        let outcome = self.execute_command(&host.node_id, CommandType::Wake, payload, idempotency_key).await?;
        Ok(match outcome {
            CommandOutcome::Queued(_) => WakeResponse {
                success: true,
                message: "Command queued (node offline)".to_string(),
                node_id: host.node_id.clone(),
                location: host.location.clone(),
            },
            CommandOutcome::Completed { .. } => WakeResponse {
                success: true,
                message: format!("Wake-on-LAN packet sent to {}", host.fully_qualified_name),
                node_id: host.node_id.clone(),
                location: host.location.clone(),
            },
        })
    }

    pub async fn route_ping_host(&self, fqn: &str, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let payload = json!({ "hostName": host.name, "mac": host.mac, "ip": host.ip });
        let outcome = self.execute_command(&host.node_id, CommandType::PingHost, payload, idempotency_key).await?;
        Ok(host_command_response(&outcome, &host, "Ping"))
    }

    pub async fn route_sleep_host(&self, fqn: &str, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let payload = json!({ "hostName": host.name, "mac": host.mac, "ip": host.ip, "confirmation": CommandType::SleepHost.as_str() });
        let outcome = self.execute_command(&host.node_id, CommandType::SleepHost, payload, idempotency_key).await?;
        Ok(host_command_response(&outcome, &host, "Sleep"))
    }

    pub async fn route_shutdown_host(&self, fqn: &str, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let payload = json!({ "hostName": host.name, "mac": host.mac, "ip": host.ip, "confirmation": CommandType::ShutdownHost.as_str() });
        let outcome = self.execute_command(&host.node_id, CommandType::ShutdownHost, payload, idempotency_key).await?;
        Ok(host_command_response(&outcome, &host, "Shutdown"))
    }

    /// Broadcast a `scan` to every currently-connected node in parallel and
    /// aggregate the per-node outcomes (§4.2.6). Per §9's open question
    /// resolution, overall failure is reported using the first node's error
    /// when every node fails; a single success is enough to acknowledge.
    pub async fn route_scan(&self, idempotency_key: Option<&str>) -> DomainResult<ScanResponse> {
        let queued_at = Utc::now();
        let nodes = self.node_registry.get_connected_nodes();
        if nodes.is_empty() {
            return Err(DomainError::PreconditionFailed("no nodes connected to scan".to_string()));
        }

        let started_at = Utc::now();
        let outcomes = futures::future::join_all(nodes.into_iter().map(|node_id| async move {
            let result = self.execute_command(&node_id, CommandType::Scan, json!({ "immediate": true }), idempotency_key).await;
            (node_id, result)
        }))
        .await;
        let completed_at = Utc::now();

        let mut node_results = Vec::with_capacity(outcomes.len());
        let mut any_success = false;
        let mut first_error = None;
        for (node_id, outcome) in outcomes {
            match outcome {
                Ok(_) => {
                    any_success = true;
                    node_results.push(NodeScanResult { node_id, success: true, message: "Scan complete".to_string() });
                }
                Err(err) => {
                    let message = err.to_string();
                    if first_error.is_none() {
                        first_error = Some(message.clone());
                    }
                    node_results.push(NodeScanResult { node_id, success: false, message });
                }
            }
        }

        if !any_success {
            return Err(DomainError::ExecutionFailed(first_error.unwrap_or_else(|| "scan failed on every connected node".to_string())));
        }

        Ok(ScanResponse {
            state: "acknowledged".to_string(),
            queued_at,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
            last_scan_at: Some(completed_at),
            node_results,
        })
    }

    pub async fn route_scan_host_ports(&self, fqn: &str, ports: &[i64], timeout_ms: Option<u64>, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let port_list = normalize_port_list(ports);
        let mut payload = json!({ "hostName": host.name, "mac": host.mac, "ip": host.ip, "ports": port_list });
        if let Some(timeout_ms) = timeout_ms {
            payload["timeoutMs"] = json!(timeout_ms);
        }
        let outcome = self.execute_command(&host.node_id, CommandType::ScanHostPorts, payload, idempotency_key).await?;
        Ok(host_command_response(&outcome, &host, "Port scan"))
    }

    /// Dispatches even when the node is offline (§9 open question: preserved
    /// as-is) — an `update-host` just rewrites aggregator-side metadata, the
    /// node applies it on its next reconnect. `updates` is merged over the
    /// host's current values: an absent key leaves that field untouched, an
    /// explicit `null` clears it (§4.2.6).
    pub async fn route_update_host(&self, fqn: &str, updates: Value, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let merged = merge_host_updates(&host, updates);
        let outcome = self.execute_command(&host.node_id, CommandType::UpdateHost, json!({ "hostName": host.name, "updates": merged }), idempotency_key).await?;
        Ok(host_command_response(&outcome, &host, "Update"))
    }

    /// On an acknowledged delete, also removes the aggregator-side row (§4.2.6
    /// "on acknowledged success, also calls `HostAggregator.onHostRemoved`").
    pub async fn route_delete_host(&self, fqn: &str, idempotency_key: Option<&str>) -> DomainResult<HostCommandResponse> {
        let host = self.resolve_host(fqn).await?;
        let outcome = self.execute_command(&host.node_id, CommandType::DeleteHost, json!({ "hostName": host.name }), idempotency_key).await?;
        if matches!(outcome, CommandOutcome::Completed { .. }) {
            self.host_aggregator.remove_host_by_fqn(fqn).await?;
        }
        Ok(host_command_response(&outcome, &host, "Delete"))
    }

    async fn resolve_host(&self, fqn: &str) -> DomainResult<AggregatedHost> {
        self.host_aggregator.find_by_fqn(fqn).await?.ok_or_else(|| DomainError::NotFound(format!("host {fqn} not found")))
    }
}

fn host_command_response(outcome: &CommandOutcome, host: &AggregatedHost, action_label: &str) -> HostCommandResponse {
    match outcome {
        CommandOutcome::Queued(_) => HostCommandResponse {
            success: true,
            message: "Command queued (node offline)".to_string(),
            node_id: host.node_id.clone(),
            host_name: host.fully_qualified_name.clone(),
        },
        CommandOutcome::Completed { .. } => HostCommandResponse {
            success: true,
            message: format!("{action_label} acknowledged for {}", host.fully_qualified_name),
            node_id: host.node_id.clone(),
            host_name: host.fully_qualified_name.clone(),
        },
    }
}

/// Merge an operator-supplied `updates` object over the host's current
/// values. Only `name`/`location` are seeded from the existing row; every
/// other key (notably `notes`/`tags`) is taken from `updates` as-is, so a key
/// the caller omits entirely is left out of the merged payload (leaving the
/// node agent's own stored value untouched) while a key explicitly sent as
/// `null` clears it.
fn merge_host_updates(host: &AggregatedHost, updates: Value) -> Value {
    let mut merged = serde_json::Map::new();
    merged.insert("name".to_string(), json!(host.name));
    merged.insert("location".to_string(), json!(host.location));
    if let Value::Object(fields) = updates {
        for (key, value) in fields {
            merged.insert(key, value);
        }
    }
    Value::Object(merged)
}

/// Dedup, drop anything outside `[1, 65535]`, sort ascending, and cap at
/// 1024 entries (§8: `normalizePortList([80, 80, 22, 70000, -1, 443])` →
/// `[22, 80, 443]`).
#[must_use]
pub fn normalize_port_list(raw: &[i64]) -> Vec<u16> {
    let mut ports: Vec<u16> = raw.iter().filter_map(|&port| u16::try_from(port).ok()).filter(|&port| port >= 1).collect();
    ports.sort_unstable();
    ports.dedup();
    ports.truncate(1024);
    ports
}
