use serde::{Deserialize, Serialize};

/// Root configuration structure for the command-and-control core (§6, §10.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command dispatch/retry/retention configuration
    #[serde(default)]
    pub command: CommandConfig,

    /// Node-heartbeat/timeout configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Webhook delivery configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Push-notification configuration
    #[serde(default)]
    pub push: PushConfig,

    /// Schedule-worker configuration (consumed by a worker external to this core)
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            command: CommandConfig::default(),
            node: NodeConfig::default(),
            webhook: WebhookConfig::default(),
            push: PushConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".woly/coreplane.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Number of days to retain log files on disk, if file logging is enabled
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Optional directory for rotated log files; stdout-only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
            directory: None,
        }
    }
}

/// Command dispatch/retry/retention configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandConfig {
    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,

    /// Reported in error messages; the core itself does not auto-retry beyond reconnect flush
    #[serde(default = "default_command_max_retries")]
    pub max_retries: u32,

    /// Backoff base for `calculateBackoffDelay`
    #[serde(default = "default_command_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Age beyond which a queued command is failed during reconnect flush
    #[serde(default = "default_offline_command_ttl_ms")]
    pub offline_ttl_ms: u64,

    /// Pruning threshold consumed by the daily retention sweep
    #[serde(default = "default_command_retention_days")]
    pub retention_days: u32,
}

const fn default_command_timeout_ms() -> u64 {
    30_000
}

const fn default_command_max_retries() -> u32 {
    3
}

const fn default_command_retry_base_delay_ms() -> u64 {
    1_000
}

const fn default_offline_command_ttl_ms() -> u64 {
    3_600_000
}

const fn default_command_retention_days() -> u32 {
    30
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_command_timeout_ms(),
            max_retries: default_command_max_retries(),
            retry_base_delay_ms: default_command_retry_base_delay_ms(),
            offline_ttl_ms: default_offline_command_ttl_ms(),
            retention_days: default_command_retention_days(),
        }
    }
}

/// Node-heartbeat/timeout configuration (§4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeConfig {
    /// Expected interval between node heartbeats
    #[serde(default = "default_node_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// A node with no heartbeat for this long is considered offline; must be
    /// at least `2 × heartbeat_interval_ms` (enforced by validation)
    #[serde(default = "default_node_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_node_heartbeat_interval_ms() -> u64 {
    15_000
}

const fn default_node_timeout_ms() -> u64 {
    45_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_node_heartbeat_interval_ms(),
            timeout_ms: default_node_timeout_ms(),
        }
    }
}

/// Webhook delivery configuration (§4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WebhookConfig {
    /// Backoff base for retrying a failed delivery
    #[serde(default = "default_webhook_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Per-attempt delivery timeout
    #[serde(default = "default_webhook_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

const fn default_webhook_retry_base_delay_ms() -> u64 {
    1_000
}

const fn default_webhook_delivery_timeout_ms() -> u64 {
    10_000
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: default_webhook_retry_base_delay_ms(),
            delivery_timeout_ms: default_webhook_delivery_timeout_ms(),
        }
    }
}

/// Push-notification configuration (§4.7, §6). The concrete FCM/APNS HTTP
/// calls are out of scope — these values are handed to whatever
/// `PushProvider` implementation the deployment wires in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PushConfig {
    /// Master on/off switch for push delivery
    #[serde(default)]
    pub enabled: bool,

    /// FCM legacy server key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_server_key: Option<String>,

    /// APNS bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns_bearer_token: Option<String>,

    /// APNS topic (bundle id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns_topic: Option<String>,

    /// APNS host, overridable for sandbox vs production
    #[serde(default = "default_apns_host")]
    pub apns_host: String,
}

fn default_apns_host() -> String {
    "https://api.push.apple.com".to_string()
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fcm_server_key: None,
            apns_bearer_token: None,
            apns_topic: None,
            apns_host: default_apns_host(),
        }
    }
}

/// Schedule-worker configuration. The worker itself lives outside this
/// core; these values are only validated and threaded through here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    #[serde(default)]
    pub worker_enabled: bool,

    #[serde(default = "default_schedule_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_schedule_batch_size")]
    pub batch_size: u32,
}

const fn default_schedule_poll_interval_ms() -> u64 {
    5_000
}

const fn default_schedule_batch_size() -> u32 {
    50
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            worker_enabled: false,
            poll_interval_ms: default_schedule_poll_interval_ms(),
            batch_size: default_schedule_batch_size(),
        }
    }
}
