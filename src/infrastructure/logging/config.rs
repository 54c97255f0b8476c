use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::config::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_format")]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stdout)
    pub log_dir: Option<PathBuf>,

    /// Enable stdout logging
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Log retention in days
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    30
}

/// Bridges the figment-loaded, string-typed `LoggingConfig` (validated by
/// `ConfigLoader`) into the richer, enum-typed shape `LoggerImpl::init`
/// consumes. The two stay separate because `LoggingConfig` is what operators
/// write in `.woly/config.yaml`, while `LogConfig` also carries the rotation
/// policy and stdout toggle that aren't exposed as user-facing settings yet.
impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: if config.format.eq_ignore_ascii_case("pretty") { LogFormat::Pretty } else { LogFormat::Json },
            log_dir: config.directory.as_ref().map(PathBuf::from),
            enable_stdout: true,
            rotation: RotationPolicy::default(),
            retention_days: i64::from(config.retention_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_a_pretty_format_string_case_insensitively() {
        let domain = LoggingConfig { level: "debug".to_string(), format: "PRETTY".to_string(), retention_days: 7, directory: Some("/var/log/woly".to_string()) };
        let log_config = LogConfig::from(&domain);
        assert_eq!(log_config.format, LogFormat::Pretty);
        assert_eq!(log_config.level, "debug");
        assert_eq!(log_config.retention_days, 7);
        assert_eq!(log_config.log_dir, Some(PathBuf::from("/var/log/woly")));
    }

    #[test]
    fn defaults_to_json_for_any_non_pretty_format_string() {
        let domain = LoggingConfig { level: "info".to_string(), format: "json".to_string(), retention_days: 30, directory: None };
        let log_config = LogConfig::from(&domain);
        assert_eq!(log_config.format, LogFormat::Json);
        assert!(log_config.log_dir.is_none());
    }
}
