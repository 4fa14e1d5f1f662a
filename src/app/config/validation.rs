use super::{Config, ConfigError};
use crate::formatter::TimestampFormat;
use crate::buffer::MAX_QUEUE_BOUND;
use url::Url;

impl Config {
    /// Startup checks. Any failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tcp = &self.tcp_server;
        if tcp.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "tcp_server.host must not be empty".to_string(),
            ));
        }
        if tcp.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "tcp_server.port must be between 1 and 65535".to_string(),
            ));
        }
        if tcp.reconnect_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "tcp_server.reconnect_interval must be greater than 0".to_string(),
            ));
        }
        if tcp.max_reconnect_interval < tcp.reconnect_interval {
            return Err(ConfigError::InvalidConfig(format!(
                "tcp_server.max_reconnect_interval ({:?}) must not be below reconnect_interval ({:?})",
                tcp.max_reconnect_interval, tcp.reconnect_interval
            )));
        }
        if tcp.connect_timeout.is_zero() || tcp.write_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "tcp_server connect and write timeouts must be greater than 0".to_string(),
            ));
        }
        if tcp.max_write_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "tcp_server.max_write_attempts must be greater than 0".to_string(),
            ));
        }

        TimestampFormat::new(&self.formatter.options.timestamp_format)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        self.rate_limit
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("rate_limit: {e}")))?;

        if self.queue.bound == 0 || self.queue.bound > MAX_QUEUE_BOUND {
            return Err(ConfigError::InvalidConfig(format!(
                "queue.bound must be between 1 and {}, got {}",
                MAX_QUEUE_BOUND, self.queue.bound
            )));
        }

        if self.stats.report_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "stats.report_interval must be greater than 0".to_string(),
            ));
        }

        if let Some(file) = self.sources.file.as_ref().filter(|f| f.enabled) {
            if file.path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "sources.file.path must not be empty".to_string(),
                ));
            }
            if file.poll_interval.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "sources.file.poll_interval must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(jira) = self.sources.jira.as_ref().filter(|j| j.enabled) {
            let url = Url::parse(&jira.api_url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid Jira api_url '{}': {}", jira.api_url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl(format!(
                    "Jira api_url must be http(s): {}",
                    jira.api_url
                )));
            }
            if jira.username.is_empty() || jira.api_token.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "sources.jira requires username and api_token".to_string(),
                ));
            }
            if jira.poll_interval.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "sources.jira.poll_interval must be greater than 0".to_string(),
                ));
            }
        }

        if self.sources.enabled_count() == 0 {
            return Err(ConfigError::InvalidConfig(
                "no enabled source configured".to_string(),
            ));
        }

        Ok(())
    }
}
