use super::config::{LogFormat, LogLevel, LoggingConfig};
use parking_lot::RwLock;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive '{0}'")]
    InvalidDirective(String),
    #[error("Logging initialization failed: {0}")]
    InitFailed(String),
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidDirective(s.to_string())),
        }
    }
}

/// A `target=level` filter entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirective {
    pub target: String,
    pub level: LogLevel,
}

impl LogDirective {
    pub fn new(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            level,
        }
    }

    pub fn parse(directive: &str) -> Result<Self, LoggingError> {
        let Some((target, level)) = directive.split_once('=') else {
            return Err(LoggingError::InvalidDirective(directive.to_string()));
        };
        let target = target.trim();
        if target.is_empty() || level.contains('=') {
            return Err(LoggingError::InvalidDirective(directive.to_string()));
        }
        Ok(Self::new(target, level.parse()?))
    }

    pub fn to_filter_string(&self) -> String {
        format!("{}={}", self.target, self.level.as_str())
    }
}

/// Builds the tracing filter: configured level, quiet HTTP internals, and
/// `RUST_LOG` on top when it is set.
pub struct LoggingSystem {
    directives: Arc<RwLock<Vec<LogDirective>>>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Invalid directives are reported on stderr and skipped.
    pub fn add_directive(&self, directive: &str) {
        match LogDirective::parse(directive) {
            Ok(parsed) => self.directives.write().push(parsed),
            Err(e) => eprintln!("Warning: {}, skipping", e),
        }
    }

    pub fn add_default_directives(&self) {
        let mut directives = self.directives.write();
        for target in ["hyper", "hyper_util", "reqwest", "h2", "rustls"] {
            directives.push(LogDirective::new(target, LogLevel::Warn));
        }
    }

    pub fn build_filter_string(&self, default_level: LogLevel) -> String {
        let directives = self.directives.read();
        std::iter::once(default_level.as_str().to_string())
            .chain(directives.iter().map(LogDirective::to_filter_string))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn directive_count(&self) -> usize {
        self.directives.read().len()
    }

    pub fn initialize_tracing(&self, config: &LoggingConfig) -> Result<(), LoggingError> {
        let mut filter_string = self.build_filter_string(config.level);
        if let Ok(overrides) = std::env::var("RUST_LOG")
            && !overrides.trim().is_empty()
        {
            filter_string.push(',');
            filter_string.push_str(overrides.trim());
        }

        let env_filter = EnvFilter::try_new(&filter_string).map_err(|e| {
            LoggingError::InitFailed(format!("bad filter '{}': {}", filter_string, e))
        })?;

        let result = match config.format {
            LogFormat::Text => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true).with_level(true).compact())
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(false),
                )
                .try_init(),
        };
        result.map_err(|e| LoggingError::InitFailed(e.to_string()))
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global subscriber once. Later calls report whether the
/// first one succeeded.
pub fn setup_logging_safe(config: &LoggingConfig) -> Result<(), LoggingError> {
    use std::sync::Once;
    use std::sync::atomic::{AtomicBool, Ordering};

    static INIT: Once = Once::new();
    static INIT_SUCCESS: AtomicBool = AtomicBool::new(false);

    INIT.call_once(|| {
        let logging_system = LoggingSystem::new();
        logging_system.add_default_directives();
        match logging_system.initialize_tracing(config) {
            Ok(()) => INIT_SUCCESS.store(true, Ordering::Release),
            Err(e) => eprintln!("Warning: {}", e),
        }
    });

    if INIT_SUCCESS.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(LoggingError::InitFailed(
            "global subscriber could not be installed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_parsing() {
        let directive = LogDirective::parse("hyper=warn").unwrap();
        assert_eq!(directive.target, "hyper");
        assert_eq!(directive.level, LogLevel::Warn);
        assert_eq!(directive.to_filter_string(), "hyper=warn");

        for invalid in ["", "hyper", "=warn", "hyper=loud", "a=b=c"] {
            assert!(LogDirective::parse(invalid).is_err(), "{invalid}");
        }
    }

    #[test]
    fn test_invalid_directive_skipped() {
        let logging_system = LoggingSystem::new();
        logging_system.add_directive("reqwest=error");
        logging_system.add_directive("nonsense");
        assert_eq!(logging_system.directive_count(), 1);
    }

    #[test]
    fn test_build_filter_string() {
        let logging_system = LoggingSystem::new();
        assert_eq!(logging_system.build_filter_string(LogLevel::Info), "info");

        logging_system.add_default_directives();
        let filter = logging_system.build_filter_string(LogLevel::Debug);
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&filter).is_ok());
    }

    #[test]
    fn test_setup_logging_safe_is_idempotent() {
        let config = LoggingConfig::default();
        let first = setup_logging_safe(&config).is_ok();
        let second = setup_logging_safe(&config).is_ok();
        assert_eq!(first, second);
    }
}
