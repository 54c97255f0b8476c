//! Command domain model: the durable record behind every operator-initiated
//! action, and the state machine that governs its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of action a command asks a node agent to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandType {
    Wake,
    PingHost,
    SleepHost,
    ShutdownHost,
    Scan,
    ScanHostPorts,
    UpdateHost,
    DeleteHost,
}

impl CommandType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wake => "wake",
            Self::PingHost => "ping-host",
            Self::SleepHost => "sleep-host",
            Self::ShutdownHost => "shutdown-host",
            Self::Scan => "scan",
            Self::ScanHostPorts => "scan-host-ports",
            Self::UpdateHost => "update-host",
            Self::DeleteHost => "delete-host",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "wake" => Some(Self::Wake),
            "ping-host" => Some(Self::PingHost),
            "sleep-host" => Some(Self::SleepHost),
            "shutdown-host" => Some(Self::ShutdownHost),
            "scan" => Some(Self::Scan),
            "scan-host-ports" => Some(Self::ScanHostPorts),
            "update-host" => Some(Self::UpdateHost),
            "delete-host" => Some(Self::DeleteHost),
            _ => None,
        }
    }

    /// Whether this operation requires the node to be online *synchronously*
    /// before it will even be enqueued for dispatch (§4.2.6). `wake`,
    /// `update-host`, and `delete-host` are allowed to enqueue offline.
    #[must_use]
    pub const fn requires_online_node(self) -> bool {
        matches!(
            self,
            Self::PingHost | Self::SleepHost | Self::ShutdownHost | Self::Scan | Self::ScanHostPorts
        )
    }
}

/// Lifecycle state of a persisted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Queued,
    Sent,
    Acknowledged,
    Failed,
    TimedOut,
}

impl CommandState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "sent" => Some(Self::Sent),
            "acknowledged" => Some(Self::Acknowledged),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    /// Terminal states are `acknowledged`, `failed`, `timed_out` (§3).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Failed | Self::TimedOut)
    }

    /// Valid next states from this one. A record may return to `Queued`
    /// only through the external reconciliation path (requeue), which this
    /// state machine does not model as a normal transition — callers that
    /// requeue bypass `transition_to` and reset the row directly.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Queued => &[Self::Sent, Self::Failed, Self::TimedOut],
            Self::Sent => &[Self::Acknowledged, Self::Failed, Self::TimedOut],
            Self::Acknowledged | Self::Failed | Self::TimedOut => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

/// A persisted command record — the authoritative state for one
/// operator-initiated action against one node (§3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub node_id: String,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub payload: Value,
    pub idempotency_key: Option<String>,
    pub state: CommandState,
    pub error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Command {
    /// Build a fresh `queued` record. Does not touch storage — the caller
    /// (`CommandStore::enqueue`) is responsible for the idempotency-aware
    /// insert-or-return dance.
    #[must_use]
    pub fn new(id: impl Into<String>, node_id: impl Into<String>, command_type: CommandType, payload: Value, idempotency_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            node_id: node_id.into(),
            command_type,
            payload,
            idempotency_key,
            state: CommandState::Queued,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            sent_at: None,
            completed_at: None,
        }
    }

    /// Attempt the state transition, updating timestamps the way the store
    /// layer expects (invariant (a)/(b) in §3). Returns a descriptive error
    /// string rather than panicking so callers can surface it verbatim.
    pub fn transition_to(&mut self, new_state: CommandState) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "cannot transition command {} from {} to {}",
                self.id,
                self.state.as_str(),
                new_state.as_str()
            ));
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        match new_state {
            CommandState::Sent => {
                self.sent_at = Some(self.updated_at);
                self.retry_count += 1;
            }
            CommandState::Acknowledged | CommandState::Failed | CommandState::TimedOut => {
                self.completed_at = Some(self.updated_at);
            }
            CommandState::Queued => {}
        }
        Ok(())
    }

    /// Whether invariant (a) from §3 holds for this row: `sentAt` is set iff
    /// `retryCount >= 1`.
    #[must_use]
    pub const fn sent_at_invariant_holds(&self) -> bool {
        self.sent_at.is_some() == (self.retry_count >= 1)
    }

    /// Whether invariant (b) from §3 holds: `completedAt` is set iff the
    /// state is terminal.
    #[must_use]
    pub const fn completed_at_invariant_holds(&self) -> bool {
        self.completed_at.is_some() == self.state.is_terminal()
    }
}

/// Scopes a caller-supplied idempotency key by command type, per §4.2 step 1:
/// `"{type}:{trimmedKey}"`. Per-type scoping prevents collisions across
/// command kinds that happen to share a raw key.
#[must_use]
pub fn scope_idempotency_key(command_type: CommandType, raw_key: &str) -> String {
    format!("{}:{}", command_type.as_str(), raw_key.trim())
}
