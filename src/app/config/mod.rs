mod cli;
pub mod groups;
pub mod serde_helpers;
mod validation;

use crate::reliability::RateLimitConfig;
use crate::sender::DeliveryConfig;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use cli::Cli;
pub use groups::{
    FileSourceConfig, FormatterSection, JiraSourceConfig, LoggingConfig, QueueSection,
    ShutdownConfig, SourcesConfig, StatsConfig, TcpServerConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Cannot read {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Output shape of the forwarder's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Root of the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tcp_server: TcpServerConfig,
    pub formatter: FormatterSection,
    pub rate_limit: RateLimitConfig,
    pub queue: QueueSection,
    pub shutdown: ShutdownConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
    pub sources: SourcesConfig,
}

impl Config {
    /// Parse without validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process();
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) {
        self.tcp_server.host = self.tcp_server.host.trim().to_string();
        if let Some(jira) = self.sources.jira.as_mut() {
            jira.api_url = jira.api_url.trim().trim_end_matches('/').to_string();
        }
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            backoff: self.tcp_server.backoff(),
            write_timeout: self.tcp_server.write_timeout,
            write_grace: self.shutdown.write_grace,
            max_write_attempts: self.tcp_server.max_write_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OverflowPolicy;
    use crate::formatter::FormatterKind;
    use std::time::Duration;

    const FULL: &str = r#"
[tcp_server]
host = " collector.local "
port = 6514
reconnect_interval = 0.5
max_reconnect_interval = 30
write_timeout = 5.0

[formatter]
type = "cef"
[formatter.options]
vendor = "Acme"
csv_fields = ["user"]

[rate_limit]
capacity = 50
refill_rate = 10.0

[queue]
bound = 100
overflow_policy = "drop_oldest"

[shutdown]
drain_timeout = 3.0

[logging]
level = "debug"
format = "json"

[sources.file]
path = "/var/log/app.log"
poll_interval = 1.0

[sources.jira]
enabled = false
api_url = "https://example.atlassian.net/"
username = "bot"
api_token = "secret"
"#;

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml_str(FULL).unwrap();
        assert_eq!(config.tcp_server.host, "collector.local");
        assert_eq!(config.tcp_server.port, 6514);
        assert_eq!(config.tcp_server.reconnect_interval, Duration::from_millis(500));
        assert_eq!(config.tcp_server.max_reconnect_interval, Duration::from_secs(30));
        assert_eq!(config.tcp_server.max_write_attempts, 2);
        assert_eq!(config.formatter.kind, FormatterKind::Cef);
        assert_eq!(config.formatter.options.vendor, "Acme");
        assert_eq!(config.formatter.options.product, "LogForwarder");
        assert_eq!(config.rate_limit.capacity, 50);
        assert_eq!(config.queue.bound, 100);
        assert_eq!(config.queue.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(3));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);

        let file = config.sources.file.as_ref().unwrap();
        assert!(file.enabled);
        assert_eq!(file.categories, vec!["all"]);
        let jira = config.sources.jira.as_ref().unwrap();
        assert_eq!(jira.api_url, "https://example.atlassian.net");
        assert_eq!(jira.initial_lookback, Duration::from_secs(5 * 3600));
        assert_eq!(config.sources.enabled_count(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_formatter_is_parse_error() {
        let err = Config::from_toml_str("[formatter]\ntype = \"xml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_overflow_policy_is_parse_error() {
        let err = Config::from_toml_str("[queue]\noverflow_policy = \"spill\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_delivery_config_mapping() {
        let config = Config::from_toml_str(FULL).unwrap();
        let delivery = config.delivery_config();
        assert_eq!(delivery.backoff.base_delay, Duration::from_millis(500));
        assert_eq!(delivery.backoff.max_delay, Duration::from_secs(30));
        assert_eq!(delivery.write_timeout, Duration::from_secs(5));
        assert_eq!(delivery.write_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_default_config_matches_delivery_defaults() {
        assert_eq!(Config::default().delivery_config(), DeliveryConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/forwarder.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileError { .. }));
    }
}
