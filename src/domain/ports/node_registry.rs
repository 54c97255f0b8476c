//! Node-connection-tracking port (§4.4). The bidirectional transport itself
//! (WebSocket framing, session handshake) is out of scope — this trait is
//! the narrow interface the command-and-control core is allowed to depend on.

use serde_json::Value;
use std::sync::Arc;

use crate::domain::errors::DomainResult;

/// Online/offline classification derived from heartbeat recency (§4.4: a
/// node is offline once no heartbeat has arrived for `nodeTimeout`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Online,
    Offline,
}

/// The payload of an inbound `command-result` message (§4.2.2, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub command_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub state: Option<String>,
    pub host_ping: Option<Value>,
    pub host_port_scan: Option<Value>,
    pub wake_verification: Option<Value>,
    pub correlation_id: Option<String>,
}

/// The native events `NodeRegistry` emits (§4.4). `PluginEventBridge`
/// adapts a subset of these onto the typed `EventBus` (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Connected { node_id: String },
    Disconnected { node_id: String },
    CommandResult(CommandResult),
    ScanComplete { node_id: String, host_count: u64 },
    Heartbeat { node_id: String },
}

pub type NodeEventHandler = Arc<dyn Fn(NodeEvent) + Send + Sync>;

/// Tracks which node agents currently hold a live session and routes
/// outbound wire messages to them.
///
/// `is_node_connected`/`get_connected_nodes`/`send_command` must not block —
/// they observe or mutate purely in-memory session state. `get_node_status`
/// is async because an implementation may consult a persisted last-heartbeat
/// value rather than only live sessions.
pub trait NodeRegistry: Send + Sync {
    fn is_node_connected(&self, node_id: &str) -> bool;

    fn get_node_status(&self, node_id: &str) -> NodeStatus;

    fn get_connected_nodes(&self) -> Vec<String>;

    /// Best-effort synchronous write to the node's socket. Returns a
    /// `DomainError::Transport` if the write fails; never blocks.
    fn send_command(&self, node_id: &str, wire_msg: &Value) -> DomainResult<()>;

    /// Register a handler invoked for every `NodeEvent`. Returns a token
    /// that can be passed to `unsubscribe`.
    fn subscribe(&self, handler: NodeEventHandler) -> u64;

    fn unsubscribe(&self, token: u64);
}
