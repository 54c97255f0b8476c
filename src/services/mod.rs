//! Orchestration services composing the domain ports: command dispatch,
//! host reconciliation, event fan-out, and the retention sweep.

pub mod command_router;
pub mod event_bridge;
pub mod event_bus;
pub mod host_aggregator;
pub mod push_dispatcher;
pub mod retention;
pub mod webhook_dispatcher;

pub use command_router::{CommandRouter, RouterConfig};
pub use event_bridge::PluginEventBridge;
pub use event_bus::EventBus;
pub use host_aggregator::{HostAggregator, HostAggregatorEvent, ReconcileOutcome};
pub use push_dispatcher::PushDispatcher;
pub use retention::{RetentionReport, RetentionSweeper};
pub use webhook_dispatcher::WebhookDispatcher;
