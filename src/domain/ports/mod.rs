//! Domain ports (interfaces) for the command-and-control core.

pub mod command_store;
pub mod host_store;
pub mod node_registry;
pub mod push_provider;
pub mod push_store;
pub mod webhook_store;

pub use command_store::CommandStore;
pub use host_store::{HostSighting, HostStats, HostStore, UptimeSummary};
pub use node_registry::{CommandResult, NodeEvent, NodeEventHandler, NodeRegistry, NodeStatus};
pub use push_provider::{NullPushProvider, PushMessage, PushProvider};
pub use push_store::PushStore;
pub use webhook_store::WebhookStore;
