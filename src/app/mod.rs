pub mod config;
pub mod logging_system;
pub mod pipeline;
pub mod shutdown;

pub use config::{Cli, Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LoggingError, LoggingSystem, setup_logging_safe};
pub use pipeline::{Pipeline, PipelineObserver, PipelineSettings, PipelineSnapshot};
pub use shutdown::SignalHandler;

use crate::domain::ForwarderError;
use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run until SIGINT/SIGTERM, then drain and return the final stats.
    pub async fn run(self) -> Result<PipelineSnapshot, ForwarderError> {
        let shutdown = CancellationToken::new();
        let signals = SignalHandler::new(shutdown.clone());
        let listener = signals.spawn();

        let pipeline = Pipeline::from_config(&self.config)?;
        info!(
            "siem-log-forwarder v{} forwarding {} records to {}:{} ({} sources)",
            get_version(),
            self.config.formatter.kind,
            self.config.tcp_server.host,
            self.config.tcp_server.port,
            pipeline.source_count()
        );

        let result = pipeline.run(shutdown.clone()).await;

        shutdown.cancel();
        if let Err(e) = listener.await {
            warn!("Signal listener task failed: {}", e);
        }
        result
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// Main entry point for the application
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if cli.check_config {
        println!("Configuration OK: {}", cli.config.display());
        return Ok(());
    }

    if let Err(e) = setup_logging_safe(&config.logging) {
        eprintln!("Warning: {}", e);
    }

    let snapshot = App::new(config).run().await.context("Forwarder failed")?;
    info!(
        "siem-log-forwarder stopped: {} sent, {} dropped",
        snapshot.delivery.sent,
        snapshot.dropped()
    );
    Ok(())
}
