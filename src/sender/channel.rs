use super::connection::{ConnectionEvent, ConnectionState};
use super::connector::Connector;
use super::stats::{DeliveryStats, DeliveryStatsSnapshot};
use crate::buffer::EventReceiver;
use crate::formatter::Formatter;
use crate::reliability::{Backoff, BackoffConfig, TokenBucket};
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    pub backoff: BackoffConfig,
    /// A write that does not complete in time counts as a failed write.
    pub write_timeout: Duration,
    /// How long an in-flight write may continue after shutdown is requested.
    pub write_grace: Duration,
    /// Write attempts per record before it is dropped as undeliverable.
    pub max_write_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            write_timeout: Duration::from_secs(30),
            write_grace: Duration::from_secs(2),
            max_write_attempts: 2,
        }
    }
}

/// A formatted record waiting to be written. Survives reconnects so the
/// record that hit a broken connection is the first one retried.
#[derive(Debug)]
struct PendingWrite {
    payload: Bytes,
    attempts: u32,
}

enum ServeOutcome {
    ConnectionLost,
    Drained,
    Cancelled,
}

enum WriteOutcome {
    Written,
    Failed(io::Error),
    Abandoned,
}

/// Sole consumer of the event queue. Owns the connection and drives the
/// connect/backoff state machine; each record is rate limited, formatted
/// and written as one newline-terminated frame.
pub struct DeliveryChannel<C: Connector> {
    connector: C,
    formatter: Formatter,
    queue: EventReceiver,
    rate_limiter: Option<Arc<TokenBucket>>,
    config: DeliveryConfig,
    backoff: Backoff,
    state: ConnectionState,
    pending: Option<PendingWrite>,
    stats: Arc<DeliveryStats>,
}

impl<C: Connector> DeliveryChannel<C> {
    pub fn new(
        connector: C,
        formatter: Formatter,
        queue: EventReceiver,
        config: DeliveryConfig,
    ) -> Self {
        let backoff = Backoff::new(config.backoff.clone());
        Self {
            connector,
            formatter,
            queue,
            rate_limiter: None,
            config,
            backoff,
            state: ConnectionState::Disconnected,
            pending: None,
            stats: Arc::new(DeliveryStats::new()),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Shared handle for observers; stays valid after `run` returns.
    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until the queue is closed and drained, or `cancel` fires.
    /// Records still queued or pending at that point are counted as abandoned.
    pub async fn run(mut self, cancel: CancellationToken) -> DeliveryStatsSnapshot {
        info!(
            "Delivery channel starting: {} to {}",
            self.formatter.kind(),
            self.connector.peer()
        );
        self.apply(ConnectionEvent::Start);

        let mut stream: Option<C::Stream> = None;
        let mut connected_at = Instant::now();
        let mut has_connected = false;

        while !self.state.is_terminal() {
            if self.state != ConnectionState::Connected && self.nothing_left() {
                debug!("Queue closed and drained while disconnected");
                self.apply(ConnectionEvent::Shutdown);
                break;
            }

            match self.state {
                ConnectionState::Disconnected => self.apply(ConnectionEvent::RetryScheduled),
                ConnectionState::Connecting => {
                    let attempt = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = self.connector.connect() => Some(result),
                    };
                    match attempt {
                        None => self.apply(ConnectionEvent::Shutdown),
                        Some(Ok(connected)) => {
                            stream = Some(connected);
                            connected_at = Instant::now();
                            if has_connected {
                                self.stats.record_reconnect();
                                info!("Reconnected to {}", self.connector.peer());
                            } else {
                                info!("Connected to {}", self.connector.peer());
                            }
                            has_connected = true;
                            self.apply(ConnectionEvent::ConnectSucceeded);
                        }
                        Some(Err(e)) => {
                            self.stats.record_connect_failure();
                            warn!("Connection to {} failed: {}", self.connector.peer(), e);
                            self.apply(ConnectionEvent::ConnectFailed);
                        }
                    }
                }
                ConnectionState::Backoff => {
                    let delay = self.backoff.next_delay();
                    info!(
                        "Reconnecting to {} in {:?} (attempt {})",
                        self.connector.peer(),
                        delay,
                        self.backoff.attempt()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => self.apply(ConnectionEvent::Shutdown),
                        _ = tokio::time::sleep(delay) => self.apply(ConnectionEvent::BackoffElapsed),
                    }
                }
                ConnectionState::Connected => {
                    let Some(mut current) = stream.take() else {
                        self.apply(ConnectionEvent::ConnectionLost);
                        continue;
                    };
                    match self.serve(&mut current, &cancel).await {
                        ServeOutcome::ConnectionLost => {
                            drop(current);
                            if self.backoff.record_connected_period(connected_at.elapsed()) {
                                debug!("Connection was stable, backoff reset");
                            }
                            self.apply(ConnectionEvent::ConnectionLost);
                        }
                        ServeOutcome::Drained | ServeOutcome::Cancelled => {
                            let grace = self.config.write_grace;
                            if let Err(e) = close_stream(&mut current, grace).await {
                                debug!("Error closing connection: {}", e);
                            }
                            self.apply(ConnectionEvent::Shutdown);
                        }
                    }
                }
                ConnectionState::Closed => break,
            }
        }

        let abandoned = self.queue.len() as u64 + u64::from(self.pending.is_some());
        if abandoned > 0 {
            self.stats.record_abandoned(abandoned);
            warn!("Delivery channel stopped with {} undelivered records", abandoned);
        }
        self.queue.close();

        let snapshot = self.stats.snapshot();
        info!(
            "Delivery channel stopped: {} sent, {} dropped, {} reconnects",
            snapshot.sent,
            snapshot.dropped(),
            snapshot.reconnects
        );
        snapshot
    }

    fn nothing_left(&self) -> bool {
        self.pending.is_none() && self.queue.is_closed() && self.queue.is_empty()
    }

    fn apply(&mut self, event: ConnectionEvent) {
        match self.state.transition(event) {
            Ok(next) => {
                debug!("Delivery channel {} -> {} on {:?}", self.state, next, event);
                self.state = next;
            }
            Err(e) => {
                error!("{}", e);
                self.state = ConnectionState::Closed;
            }
        }
        self.stats.set_state(self.state);
    }

    async fn serve(&mut self, stream: &mut C::Stream, cancel: &CancellationToken) -> ServeOutcome {
        let mut discard = [0u8; 512];

        loop {
            if self.pending.is_none() {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ServeOutcome::Cancelled,
                    read = stream.read(&mut discard) => match read {
                        Ok(0) => {
                            warn!("Collector {} closed the connection", self.connector.peer());
                            return ServeOutcome::ConnectionLost;
                        }
                        Ok(n) => {
                            debug!("Discarding {} unexpected bytes from collector", n);
                            continue;
                        }
                        Err(e) => {
                            warn!("Connection to {} failed: {}", self.connector.peer(), e);
                            return ServeOutcome::ConnectionLost;
                        }
                    },
                    next = self.queue.recv() => match next {
                        Some(record) => record,
                        None => return ServeOutcome::Drained,
                    },
                };

                if let Some(limiter) = &self.rate_limiter {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            self.stats.record_abandoned(1);
                            return ServeOutcome::Cancelled;
                        }
                        _ = limiter.acquire() => {}
                    }
                }

                match self.formatter.format(&record) {
                    Ok(payload) => self.pending = Some(PendingWrite { payload, attempts: 0 }),
                    Err(e) => {
                        self.stats.record_format_drop();
                        warn!(
                            "Dropping record from {} that could not be formatted: {}",
                            record.source(),
                            e
                        );
                        continue;
                    }
                }
            }

            let Some(mut write) = self.pending.take() else {
                continue;
            };

            match write_payload(
                stream,
                &write.payload,
                self.config.write_timeout,
                self.config.write_grace,
                cancel,
            )
            .await
            {
                WriteOutcome::Written => {
                    self.stats.record_sent(write.payload.len() as u64);
                }
                WriteOutcome::Failed(e) => {
                    write.attempts += 1;
                    self.stats.record_write_failure();
                    warn!("Write to {} failed: {}", self.connector.peer(), e);
                    if write.attempts >= self.config.max_write_attempts {
                        self.stats.record_undeliverable();
                        warn!(
                            "Dropping record after {} failed write attempts",
                            write.attempts
                        );
                    } else {
                        self.stats.record_retry();
                        self.pending = Some(write);
                    }
                    return ServeOutcome::ConnectionLost;
                }
                WriteOutcome::Abandoned => {
                    self.pending = Some(write);
                    return ServeOutcome::Cancelled;
                }
            }
        }
    }
}

async fn write_payload<S>(
    stream: &mut S,
    payload: &[u8],
    write_timeout: Duration,
    grace: Duration,
    cancel: &CancellationToken,
) -> WriteOutcome
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let write = async {
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok::<(), io::Error>(())
    };
    tokio::pin!(write);

    let finished = tokio::select! {
        result = tokio::time::timeout(write_timeout, &mut write) => Some(result),
        _ = cancel.cancelled() => None,
    };

    let result = match finished {
        Some(result) => result,
        None => match tokio::time::timeout(grace, &mut write).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!("In-flight write abandoned after {:?} shutdown grace", grace);
                return WriteOutcome::Abandoned;
            }
        },
    };

    match result {
        Ok(Ok(())) => WriteOutcome::Written,
        Ok(Err(e)) => WriteOutcome::Failed(e),
        Err(_) => WriteOutcome::Failed(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write did not complete within {:?}", write_timeout),
        )),
    }
}

async fn close_stream<S>(stream: &mut S, grace: Duration) -> io::Result<()>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    match tokio::time::timeout(grace, stream.shutdown()).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "shutdown timed out")),
    }
}
