// Lock-free delivery statistics.
//
// Written only by the delivery loop, read by the stats reporter and the
// orchestrator at any time.

use super::connection::{AtomicConnectionState, ConnectionState};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct DeliveryStats {
    state: AtomicConnectionState,
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_failures: AtomicU64,
    retried: AtomicU64,
    dropped_undeliverable: AtomicU64,
    dropped_format: AtomicU64,
    abandoned: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
    last_send_time: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state);
    }

    pub fn record_sent(&self, bytes: u64) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_send_time.store(now, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.dropped_undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_format_drop(&self) {
        self.dropped_format.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            state: self.state.load(),
            sent: self.sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped_undeliverable: self.dropped_undeliverable.load(Ordering::Relaxed),
            dropped_format: self.dropped_format.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_send_time: self.last_send_time.load(Ordering::Relaxed),
        }
    }
}

/// Immutable copy of [`DeliveryStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub state: ConnectionState,
    pub sent: u64,
    pub bytes_sent: u64,
    pub write_failures: u64,
    pub retried: u64,
    pub dropped_undeliverable: u64,
    pub dropped_format: u64,
    pub abandoned: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
    /// Unix seconds of the last successful write, 0 if none.
    pub last_send_time: u64,
}

impl DeliveryStatsSnapshot {
    /// Records lost on the delivery side, excluding queue overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped_undeliverable + self.dropped_format + self.abandoned
    }

    /// Fraction of write attempts that succeeded (1.0 when nothing was written).
    pub fn success_rate(&self) -> f64 {
        let attempts = self.sent + self.write_failures;
        if attempts == 0 {
            return 1.0;
        }
        self.sent as f64 / attempts as f64
    }
}
