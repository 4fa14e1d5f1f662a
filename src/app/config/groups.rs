use super::{LogFormat, LogLevel};
use crate::buffer::{OverflowPolicy, QueueConfig};
use crate::formatter::{FormatterKind, FormatterOptions};
use crate::reliability::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpServerConfig {
    pub host: String,
    pub port: u16,
    /// Base reconnect delay.
    #[serde(with = "super::serde_helpers")]
    pub reconnect_interval: Duration,
    /// Reconnect delay ceiling.
    #[serde(with = "super::serde_helpers")]
    pub max_reconnect_interval: Duration,
    #[serde(with = "super::serde_helpers")]
    pub stability_window: Duration,
    pub jitter: bool,
    #[serde(with = "super::serde_helpers")]
    pub connect_timeout: Duration,
    #[serde(with = "super::serde_helpers")]
    pub write_timeout: Duration,
    pub max_write_attempts: u32,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 514,
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(60),
            stability_window: Duration::from_secs(30),
            jitter: true,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(30),
            max_write_attempts: 2,
        }
    }
}

impl TcpServerConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay: self.reconnect_interval,
            max_delay: self.max_reconnect_interval,
            jitter: self.jitter,
            stability_window: self.stability_window,
            ..BackoffConfig::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterSection {
    #[serde(rename = "type")]
    pub kind: FormatterKind,
    pub options: FormatterOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub bound: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueSection {
    fn default() -> Self {
        let defaults = QueueConfig::default();
        Self {
            bound: defaults.bound,
            overflow_policy: defaults.overflow_policy,
        }
    }
}

impl From<QueueSection> for QueueConfig {
    fn from(section: QueueSection) -> Self {
        QueueConfig {
            bound: section.bound,
            overflow_policy: section.overflow_policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for the queue to drain before remaining records are abandoned.
    #[serde(with = "super::serde_helpers")]
    pub drain_timeout: Duration,
    /// Extra time an in-flight write gets once shutdown starts.
    #[serde(with = "super::serde_helpers")]
    pub write_grace: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            write_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    #[serde(with = "super::serde_helpers")]
    pub report_interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

fn all_categories() -> Vec<String> {
    vec!["all".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub path: PathBuf,
    #[serde(default = "default_file_poll", with = "super::serde_helpers")]
    pub poll_interval: Duration,
    #[serde(default = "all_categories")]
    pub categories: Vec<String>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraSourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_url: String,
    pub username: String,
    pub api_token: String,
    #[serde(default = "default_jira_poll", with = "super::serde_helpers")]
    pub poll_interval: Duration,
    #[serde(default = "default_lookback", with = "super::serde_helpers")]
    pub initial_lookback: Duration,
    #[serde(default = "all_categories")]
    pub categories: Vec<String>,
}

impl fmt::Debug for JiraSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraSourceConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("initial_lookback", &self.initial_lookback)
            .field("categories", &self.categories)
            .finish()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_file_poll() -> Duration {
    Duration::from_secs(5)
}

fn default_jira_poll() -> Duration {
    Duration::from_secs(300)
}

fn default_lookback() -> Duration {
    Duration::from_secs(5 * 3600)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub file: Option<FileSourceConfig>,
    pub jira: Option<JiraSourceConfig>,
}

impl SourcesConfig {
    pub fn enabled_count(&self) -> usize {
        usize::from(self.file.as_ref().is_some_and(|f| f.enabled))
            + usize::from(self.jira.as_ref().is_some_and(|j| j.enabled))
    }
}
