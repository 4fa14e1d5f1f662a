use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Turns SIGINT/SIGTERM into a cancellation of the shared shutdown token.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    shutdown: CancellationToken,
}

impl SignalHandler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Listen in the background. The task ends once a signal arrives or the
    /// token is cancelled by someone else.
    pub fn spawn(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                received = wait_for_signal() => {
                    match received {
                        Some(name) => info!("Received {}, initiating graceful shutdown", name),
                        None => warn!("Signal listener failed, initiating shutdown"),
                    }
                    shutdown.cancel();
                }
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!("Failed to install SIGTERM handler: {}", err);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        received = ctrl_c() => received,
        _ = sigterm.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    ctrl_c().await
}

async fn ctrl_c() -> Option<&'static str> {
    match signal::ctrl_c().await {
        Ok(()) => Some("SIGINT (Ctrl+C)"),
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            None
        }
    }
}
