//! In-memory `NodeRegistry`. The real transport (WebSocket session
//! handling) is out of scope (§1) — this adapter is driven by explicit
//! `note_*` calls from whatever owns the actual socket, and is also the
//! registry used by every test in this crate that needs a `NodeRegistry`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::node_registry::CommandResult;
use crate::domain::ports::{NodeEvent, NodeEventHandler, NodeRegistry, NodeStatus};

pub struct InMemoryNodeRegistry {
    connected: RwLock<HashSet<String>>,
    last_heartbeat: RwLock<HashMap<String, DateTime<Utc>>>,
    node_timeout_ms: i64,
    sent_messages: Mutex<Vec<(String, Value)>>,
    subscribers: RwLock<Vec<(u64, NodeEventHandler)>>,
    next_token: AtomicU64,
}

impl InMemoryNodeRegistry {
    #[must_use]
    pub fn new(node_timeout_ms: u64) -> Self {
        Self {
            connected: RwLock::new(HashSet::new()),
            last_heartbeat: RwLock::new(HashMap::new()),
            node_timeout_ms: node_timeout_ms as i64,
            sent_messages: Mutex::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn emit(&self, event: NodeEvent) {
        let subs = self.subscribers.read().expect("node registry subscriber lock poisoned");
        for (_, handler) in subs.iter() {
            handler(event.clone());
        }
    }

    pub fn note_connected(&self, node_id: &str) {
        self.connected.write().expect("node registry lock poisoned").insert(node_id.to_string());
        self.last_heartbeat.write().expect("node registry lock poisoned").insert(node_id.to_string(), Utc::now());
        self.emit(NodeEvent::Connected { node_id: node_id.to_string() });
    }

    pub fn note_disconnected(&self, node_id: &str) {
        self.connected.write().expect("node registry lock poisoned").remove(node_id);
        self.emit(NodeEvent::Disconnected { node_id: node_id.to_string() });
    }

    pub fn note_heartbeat(&self, node_id: &str) {
        self.last_heartbeat.write().expect("node registry lock poisoned").insert(node_id.to_string(), Utc::now());
        self.emit(NodeEvent::Heartbeat { node_id: node_id.to_string() });
    }

    pub fn note_command_result(&self, result: CommandResult) {
        self.emit(NodeEvent::CommandResult(result));
    }

    pub fn note_scan_complete(&self, node_id: &str, host_count: u64) {
        self.emit(NodeEvent::ScanComplete { node_id: node_id.to_string(), host_count });
    }

    /// Messages handed to `send_command`, in order — the test-facing
    /// substitute for an actual socket write.
    pub fn sent_messages(&self) -> Vec<(String, Value)> {
        self.sent_messages.lock().expect("node registry sent-messages lock poisoned").clone()
    }
}

impl NodeRegistry for InMemoryNodeRegistry {
    fn is_node_connected(&self, node_id: &str) -> bool {
        self.connected.read().expect("node registry lock poisoned").contains(node_id)
    }

    fn get_node_status(&self, node_id: &str) -> NodeStatus {
        if !self.is_node_connected(node_id) {
            return NodeStatus::Offline;
        }
        let last_heartbeat = self.last_heartbeat.read().expect("node registry lock poisoned").get(node_id).copied();
        match last_heartbeat {
            Some(seen) if (Utc::now() - seen).num_milliseconds() <= self.node_timeout_ms => NodeStatus::Online,
            _ => NodeStatus::Offline,
        }
    }

    fn get_connected_nodes(&self) -> Vec<String> {
        self.connected.read().expect("node registry lock poisoned").iter().cloned().collect()
    }

    fn send_command(&self, node_id: &str, wire_msg: &Value) -> DomainResult<()> {
        if !self.is_node_connected(node_id) {
            return Err(DomainError::Transport(format!("node {node_id} is not connected")));
        }
        self.sent_messages.lock().expect("node registry sent-messages lock poisoned").push((node_id.to_string(), wire_msg.clone()));
        Ok(())
    }

    fn subscribe(&self, handler: NodeEventHandler) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().expect("node registry subscriber lock poisoned").push((token, handler));
        token
    }

    fn unsubscribe(&self, token: u64) {
        self.subscribers.write().expect("node registry subscriber lock poisoned").retain(|(t, _)| *t != token);
    }
}
