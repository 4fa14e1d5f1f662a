use super::backpressure::BackpressureLevel;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lock-free queue counters, updated by producers and the consumer.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
}

impl QueueMetrics {
    pub(crate) fn record_enqueue(&self, depth: usize) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.depth.store(depth, Ordering::Relaxed);
        self.update_peak(depth);
    }

    pub(crate) fn record_dequeue(&self, depth: usize) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.depth.store(depth, Ordering::Relaxed);
    }

    /// Returns the total number of overflow drops so far.
    pub(crate) fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_depth.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_depth.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }

    pub fn snapshot(&self, bound: usize) -> QueueMetricsSnapshot {
        let depth = self.depth();
        QueueMetricsSnapshot {
            bound,
            depth,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped(),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
            fill_ratio: depth as f64 / bound.max(1) as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMetricsSnapshot {
    pub bound: usize,
    pub depth: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub peak_depth: usize,
    pub fill_ratio: f64,
}

impl QueueMetricsSnapshot {
    pub fn backpressure_level(&self) -> BackpressureLevel {
        BackpressureLevel::from_fill_ratio(self.fill_ratio)
    }
}
