use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("invalid command.max_retries: {0}. Cannot be 0")]
    InvalidCommandMaxRetries(u32),

    #[error("invalid command.retry_base_delay_ms: {0}. Must be positive")]
    InvalidCommandRetryBaseDelay(u64),

    #[error("invalid command.timeout_ms: {0}. Must be positive")]
    InvalidCommandTimeout(u64),

    #[error(
        "node.timeout_ms ({0}) must be at least 2 × node.heartbeat_interval_ms ({1}); a smaller value would flap nodes offline between heartbeats"
    )]
    NodeTimeoutTooSmall(u64, u64),

    #[error("webhook.retry_base_delay_ms: {0}. Must be positive")]
    InvalidWebhookRetryBaseDelay(u64),

    #[error("push notifications enabled but no fcm_server_key or apns_bearer_token configured")]
    PushEnabledWithoutProviderCredentials,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `.woly/config.yaml` (project config)
    /// 3. `.woly/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`WOLY_*` prefix, highest priority)
    ///
    /// Loading configuration *from* the environment in a deployed process
    /// (resolving the search paths, watching for changes) is the hosting
    /// binary's concern; this loader only defines the merge precedence and
    /// validation rules once a set of providers is handed to it.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".woly/config.yaml"))
            .merge(Yaml::file(".woly/local.yaml"))
            .merge(Env::prefixed("WOLY_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project-local
    /// search path. Used by tests and by alternate deployment tooling.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.command.max_retries == 0 {
            return Err(ConfigError::InvalidCommandMaxRetries(config.command.max_retries));
        }
        if config.command.retry_base_delay_ms == 0 {
            return Err(ConfigError::InvalidCommandRetryBaseDelay(config.command.retry_base_delay_ms));
        }
        if config.command.timeout_ms == 0 {
            return Err(ConfigError::InvalidCommandTimeout(config.command.timeout_ms));
        }

        if config.node.timeout_ms < 2 * config.node.heartbeat_interval_ms {
            return Err(ConfigError::NodeTimeoutTooSmall(config.node.timeout_ms, config.node.heartbeat_interval_ms));
        }

        if config.webhook.retry_base_delay_ms == 0 {
            return Err(ConfigError::InvalidWebhookRetryBaseDelay(config.webhook.retry_base_delay_ms));
        }

        if config.push.enabled && config.push.fcm_server_key.is_none() && config.push.apns_bearer_token.is_none() {
            return Err(ConfigError::PushEnabledWithoutProviderCredentials);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_override_is_validated() {
        let yaml = r"
command:
  timeout_ms: 15000
  max_retries: 5
node:
  heartbeat_interval_ms: 10000
  timeout_ms: 20000
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        ConfigLoader::validate(&config).expect("valid override should pass");
        assert_eq!(config.command.timeout_ms, 15000);
    }

    #[test]
    fn rejects_node_timeout_below_double_heartbeat() {
        let mut config = Config::default();
        config.node.heartbeat_interval_ms = 10_000;
        config.node.timeout_ms = 15_000;
        let result = ConfigLoader::validate(&config);
        assert!(matches!(result, Err(ConfigError::NodeTimeoutTooSmall(15_000, 10_000))));
    }

    #[test]
    fn rejects_zero_max_retries() {
        let mut config = Config::default();
        config.command.max_retries = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidCommandMaxRetries(0))));
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn rejects_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));
    }

    #[test]
    fn rejects_push_enabled_without_credentials() {
        let mut config = Config::default();
        config.push.enabled = true;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::PushEnabledWithoutProviderCredentials)));
    }

    #[test]
    fn push_enabled_with_fcm_key_only_is_valid() {
        let mut config = Config::default();
        config.push.enabled = true;
        config.push.fcm_server_key = Some("key".to_string());
        ConfigLoader::validate(&config).expect("fcm-only push config should be valid");
    }

    #[test]
    fn env_prefix_uses_double_underscore_for_nested_fields() {
        unsafe {
            env::set_var("WOLY_COMMAND__TIMEOUT_MS", "5000");
            env::set_var("WOLY_LOGGING__LEVEL", "debug");
        }
        assert_eq!(env::var("WOLY_COMMAND__TIMEOUT_MS").unwrap(), "5000");
        assert_eq!(env::var("WOLY_LOGGING__LEVEL").unwrap(), "debug");
        unsafe {
            env::remove_var("WOLY_COMMAND__TIMEOUT_MS");
            env::remove_var("WOLY_LOGGING__LEVEL");
        }
    }

    #[test]
    fn hierarchical_merging_lets_override_win_while_base_persists() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "command:\n  timeout_ms: 5000\nlogging:\n  level: info\n  format: json").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "command:\n  timeout_ms: 15000\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.command.timeout_ms, 15000, "override should win");
        assert_eq!(config.logging.level, "debug", "override should win for nested fields");
        assert_eq!(config.logging.format, "json", "base value should persist when not overridden");
    }
}
