//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod command;
pub mod config;
pub mod event;
pub mod host;
pub mod push;
pub mod webhook;

pub use command::{Command, CommandState, CommandType};
pub use config::{CommandConfig, Config, DatabaseConfig, LoggingConfig, NodeConfig, PushConfig, ScheduleConfig, WebhookConfig};
pub use event::{Event, EventType};
pub use host::{AggregatedHost, HostStatus, HostStatusHistoryEntry};
pub use push::{NotificationPreferences, Platform, PushDevice, PushSendResult, QuietHours};
pub use webhook::{DeliveryStatus, WebhookDeliveryLog, WebhookTarget};
