use super::config::Config;
use crate::buffer::{EventSender, QueueConfig, QueueMetricsSnapshot, QueueMonitor, event_queue};
use crate::domain::ForwarderError;
use crate::formatter::Formatter;
use crate::reliability::{BackoffConfig, HealthStatus, RateLimitConfig, TokenBucket};
use crate::sender::{
    ConnectionState, Connector, DeliveryChannel, DeliveryConfig, DeliveryStats,
    DeliveryStatsSnapshot, TcpConnector,
};
use crate::source::{
    CategoryFilter, FileSource, JiraConfig, JiraSource, LogSource, SourceReport, SourceRunner,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub queue: QueueMetricsSnapshot,
    pub delivery: DeliveryStatsSnapshot,
}

impl PipelineSnapshot {
    pub fn state(&self) -> ConnectionState {
        self.delivery.state
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from(self.delivery.state)
    }

    /// Records lost anywhere: queue overflow plus delivery-side drops.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped + self.delivery.dropped()
    }
}

/// Cheap cloneable handle for reading pipeline state from other tasks.
#[derive(Debug, Clone)]
pub struct PipelineObserver {
    monitor: QueueMonitor,
    stats: Arc<DeliveryStats>,
}

impl PipelineObserver {
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            queue: self.monitor.metrics(),
            delivery: self.stats.snapshot(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.stats.state()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from(self.stats.state())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub drain_timeout: Duration,
    pub report_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            report_interval: Duration::from_secs(60),
        }
    }
}

/// Wires sources, the event queue and the delivery channel together and
/// owns their lifecycle: start delivery, start sources, and on shutdown stop
/// sources, close the queue and drain it within `drain_timeout`.
pub struct Pipeline<C: Connector> {
    sender: EventSender,
    monitor: QueueMonitor,
    channel: DeliveryChannel<C>,
    stats: Arc<DeliveryStats>,
    sources: Vec<(String, BoxFuture<'static, SourceReport>)>,
    stop_sources: CancellationToken,
    error_backoff: BackoffConfig,
    settings: PipelineSettings,
}

impl<C: Connector> Pipeline<C> {
    pub fn new(
        connector: C,
        formatter: Formatter,
        queue: QueueConfig,
        rate_limit: RateLimitConfig,
        delivery: DeliveryConfig,
        settings: PipelineSettings,
    ) -> Result<Self, ForwarderError> {
        let (sender, receiver, monitor) = event_queue(queue)?;
        let limiter = Arc::new(TokenBucket::new(rate_limit)?);
        let error_backoff = delivery.backoff.clone();
        let channel =
            DeliveryChannel::new(connector, formatter, receiver, delivery).with_rate_limiter(limiter);
        let stats = channel.stats();

        Ok(Self {
            sender,
            monitor,
            channel,
            stats,
            sources: Vec::new(),
            stop_sources: CancellationToken::new(),
            error_backoff,
            settings,
        })
    }

    /// Producer handle for callers that feed records directly.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn observer(&self) -> PipelineObserver {
        PipelineObserver {
            monitor: self.monitor.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn add_source<S: LogSource>(
        &mut self,
        source: S,
        poll_interval: Duration,
        filter: CategoryFilter,
    ) {
        let name = source.name().to_string();
        let runner = SourceRunner::new(source, self.sender.clone(), poll_interval)
            .with_filter(filter)
            .with_error_backoff(self.error_backoff.clone());
        self.sources
            .push((name, runner.run(self.stop_sources.clone()).boxed()));
    }

    /// Run until `shutdown` fires (or every producer is gone and the queue
    /// has drained), then stop in order and return the final snapshot.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineSnapshot, ForwarderError> {
        let Pipeline {
            sender,
            monitor,
            channel,
            stats,
            sources,
            stop_sources,
            settings,
            ..
        } = self;

        let observer = PipelineObserver {
            monitor: monitor.clone(),
            stats: stats.clone(),
        };
        let hard_stop = CancellationToken::new();
        let mut delivery = tokio::spawn(channel.run(hard_stop.clone()));

        info!("Pipeline starting with {} sources", sources.len());
        let source_handles: Vec<(String, JoinHandle<SourceReport>)> = sources
            .into_iter()
            .map(|(name, run)| (name, tokio::spawn(run)))
            .collect();
        // From here on only sources and external clones keep the queue open.
        drop(sender);

        let stop_reporter = CancellationToken::new();
        let reporter = tokio::spawn(report_stats(
            observer.clone(),
            settings.report_interval,
            stop_reporter.clone(),
        ));

        let finished_early = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = &mut delivery => Some(result),
        };

        info!("Pipeline shutting down, stopping sources");
        stop_sources.cancel();
        let mut unsent = 0;
        for (name, handle) in source_handles {
            match handle.await {
                Ok(report) => unsent += report.abandoned,
                Err(e) => error!("Source {} task failed: {}", name, e),
            }
        }
        if unsent > 0 {
            stats.record_abandoned(unsent);
            warn!("{} fetched records were never enqueued before sources stopped", unsent);
        }
        monitor.close();

        let delivery_result = match finished_early {
            Some(result) => result,
            None => match tokio::time::timeout(settings.drain_timeout, &mut delivery).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Drain timeout of {:?} exceeded with {} records still queued, abandoning them",
                        settings.drain_timeout,
                        monitor.depth()
                    );
                    hard_stop.cancel();
                    delivery.await
                }
            },
        };

        stop_reporter.cancel();
        if let Err(e) = reporter.await {
            warn!("Stats reporter task failed: {}", e);
        }

        delivery_result
            .map_err(|e| ForwarderError::Shutdown(format!("delivery task failed: {}", e)))?;

        let snapshot = observer.snapshot();
        log_snapshot("Final pipeline stats", &snapshot);
        Ok(snapshot)
    }
}

impl Pipeline<TcpConnector> {
    /// Build the production pipeline from configuration: TCP delivery plus
    /// every enabled source.
    pub fn from_config(config: &Config) -> Result<Self, ForwarderError> {
        let tcp = &config.tcp_server;
        let connector = TcpConnector::new(&tcp.host, tcp.port, tcp.connect_timeout);
        let formatter = Formatter::new(config.formatter.kind, &config.formatter.options)?;

        let mut pipeline = Pipeline::new(
            connector,
            formatter,
            config.queue.into(),
            config.rate_limit,
            config.delivery_config(),
            PipelineSettings {
                drain_timeout: config.shutdown.drain_timeout,
                report_interval: config.stats.report_interval,
            },
        )?;

        if let Some(file) = config.sources.file.as_ref().filter(|f| f.enabled) {
            info!("Enabling file source for {}", file.path.display());
            pipeline.add_source(
                FileSource::new(&file.path),
                file.poll_interval,
                CategoryFilter::from_categories(&file.categories),
            );
        }

        if let Some(jira) = config.sources.jira.as_ref().filter(|j| j.enabled) {
            info!("Enabling Jira audit source for {}", jira.api_url);
            let mut jira_config =
                JiraConfig::new(jira.api_url.clone(), jira.username.clone(), jira.api_token.clone());
            jira_config.initial_lookback = jira.initial_lookback;
            pipeline.add_source(
                JiraSource::new(jira_config)?,
                jira.poll_interval,
                CategoryFilter::from_categories(&jira.categories),
            );
        }

        Ok(pipeline)
    }
}

fn log_snapshot(label: &str, snapshot: &PipelineSnapshot) {
    info!(
        "{}: state={} sent={} dropped={} retried={} reconnects={} queue_depth={}/{}",
        label,
        snapshot.state(),
        snapshot.delivery.sent,
        snapshot.dropped(),
        snapshot.delivery.retried,
        snapshot.delivery.reconnects,
        snapshot.queue.depth,
        snapshot.queue.bound
    );
}

async fn report_stats(observer: PipelineObserver, every: Duration, stop: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => log_snapshot("Pipeline stats", &observer.snapshot()),
        }
    }
}
