use super::{CategoryFilter, LogSource};
use crate::buffer::EventSender;
use crate::reliability::{Backoff, BackoffConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub polls: u64,
    pub forwarded: u64,
    pub filtered: u64,
    pub errors: u64,
    /// Records fetched and accepted by the filter but never enqueued
    /// because the runner stopped first.
    pub abandoned: u64,
}

/// Drives one source: poll, filter, enqueue, sleep, until stopped or the
/// queue closes. A failed poll only delays this source.
pub struct SourceRunner<S: LogSource> {
    source: S,
    sender: EventSender,
    filter: CategoryFilter,
    poll_interval: Duration,
    backoff: Backoff,
}

impl<S: LogSource> SourceRunner<S> {
    pub fn new(source: S, sender: EventSender, poll_interval: Duration) -> Self {
        Self {
            source,
            sender,
            filter: CategoryFilter::all(),
            poll_interval,
            backoff: Backoff::new(BackoffConfig::default()),
        }
    }

    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_error_backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Backoff::new(config);
        self
    }

    pub async fn run(mut self, stop: CancellationToken) -> SourceReport {
        let name = self.source.name().to_string();
        let mut report = SourceReport::default();
        info!("Source {} started (poll interval {:?})", name, self.poll_interval);

        'outer: loop {
            let polled = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                result = self.source.poll() => result,
            };
            report.polls += 1;

            let wait = match polled {
                Ok(records) => {
                    self.backoff.reset();
                    let fetched = records.len();
                    let mut pending = records.into_iter();
                    while let Some(record) = pending.next() {
                        if !self.filter.matches(record.category()) {
                            report.filtered += 1;
                            continue;
                        }
                        let enqueued = tokio::select! {
                            biased;
                            _ = stop.cancelled() => false,
                            result = self.sender.enqueue(record) => result.is_ok(),
                        };
                        if !enqueued {
                            let rest = pending
                                .filter(|r| self.filter.matches(r.category()))
                                .count();
                            report.abandoned += 1 + rest as u64;
                            if !stop.is_cancelled() {
                                debug!("Queue closed, source {} stopping", name);
                            }
                            break 'outer;
                        }
                        report.forwarded += 1;
                    }
                    if fetched > 0 {
                        debug!("Source {} polled {} records", name, fetched);
                    }
                    self.poll_interval
                }
                Err(e) => {
                    report.errors += 1;
                    let delay = self.backoff.next_delay();
                    warn!("Source {} poll failed: {}; retrying in {:?}", name, e, delay);
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if report.abandoned > 0 {
            warn!(
                "Source {} stopped with {} fetched records not enqueued",
                name, report.abandoned
            );
        }
        info!(
            "Source {} stopped: {} forwarded, {} filtered, {} poll errors",
            name, report.forwarded, report.filtered, report.errors
        );
        report
    }
}
