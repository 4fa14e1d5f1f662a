use super::{Config, ConfigError, LogLevel};
use crate::formatter::FormatterKind;
use clap::Parser;
use std::path::PathBuf;

/// Command line; every flag can also come from the environment and wins
/// over the value in the config file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, env = "FORWARDER_CONFIG", default_value = "config/forwarder.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Collector host
    #[arg(long, env = "FORWARDER_HOST")]
    pub host: Option<String>,

    /// Collector port
    #[arg(long, env = "FORWARDER_PORT")]
    pub port: Option<u16>,

    /// Wire format (json, cef, csv)
    #[arg(long, env = "FORWARDER_FORMAT")]
    pub format: Option<FormatterKind>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(host) = &self.host {
            config.tcp_server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.tcp_server.port = port;
        }
        if let Some(format) = self.format {
            config.formatter.kind = format;
        }
    }
}

impl Config {
    /// File first, then CLI/env overrides, then validation.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(&cli.config).map_err(|source| ConfigError::FileError {
                path: cli.config.clone(),
                source,
            })?;
        let mut config = Config::from_toml_str(&content)?;
        cli.apply_overrides(&mut config);
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn from_args_and_env<I, T>(args: I) -> Result<(Cli, Self), ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        let config = Self::from_cli(&cli)?;
        Ok((cli, config))
    }
}
