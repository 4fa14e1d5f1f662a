use super::backpressure::OverflowPolicy;
use super::metrics::{QueueMetrics, QueueMetricsSnapshot};
use crate::domain::NormalizedRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};

/// Upper bound accepted for a queue to avoid absurd allocations.
pub const MAX_QUEUE_BOUND: usize = 10_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid queue bound: {0}")]
    InvalidCapacity(usize),
}

#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Queue is closed")]
    Closed(NormalizedRecord),
    #[error("Queue is full")]
    Full(NormalizedRecord),
}

impl EnqueueError {
    pub fn into_record(self) -> NormalizedRecord {
        match self {
            EnqueueError::Closed(record) | EnqueueError::Full(record) => record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub bound: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            bound: 10_000,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

#[derive(Debug)]
struct State {
    items: VecDeque<NormalizedRecord>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    not_empty: Notify,
    // One permit per free slot; only consulted under the blocking policy.
    // Tokio's semaphore queues waiters fairly, so blocked producers resume
    // in the order they arrived.
    slots: Semaphore,
    senders: AtomicUsize,
    config: QueueConfig,
    metrics: QueueMetrics,
}

impl Shared {
    fn close(&self) {
        let was_open = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if was_open {
            self.slots.close();
            self.not_empty.notify_one();
            tracing::debug!("Event queue closed");
        }
    }

    fn push(&self, record: NormalizedRecord) -> Result<(), EnqueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EnqueueError::Closed(record));
        }

        let mut evicted = false;
        if state.items.len() >= self.config.bound {
            // Only reachable under DropOldest: Block reserves a slot first.
            state.items.pop_front();
            evicted = true;
        }
        state.items.push_back(record);
        // Depth must be stored before the lock is released.
        self.metrics.record_enqueue(state.items.len());
        drop(state);

        if evicted {
            let total = self.metrics.record_drop();
            if total == 1 || total % 1000 == 0 {
                tracing::warn!(
                    "Event queue full (bound {}), dropped oldest record ({} dropped so far)",
                    self.config.bound,
                    total
                );
            }
        }
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<NormalizedRecord> {
        let mut state = self.state.lock();
        let record = state.items.pop_front()?;
        self.metrics.record_dequeue(state.items.len());
        drop(state);

        if self.config.overflow_policy == OverflowPolicy::Block {
            self.slots.add_permits(1);
        }
        Some(record)
    }
}

/// Create a bounded FIFO shared by many producers and drained by one consumer.
pub fn event_queue(
    config: QueueConfig,
) -> Result<(EventSender, EventReceiver, QueueMonitor), BufferError> {
    if config.bound == 0 || config.bound > MAX_QUEUE_BOUND {
        return Err(BufferError::InvalidCapacity(config.bound));
    }

    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::with_capacity(config.bound.min(4096)),
            closed: false,
        }),
        not_empty: Notify::new(),
        slots: Semaphore::new(config.bound),
        senders: AtomicUsize::new(1),
        config,
        metrics: QueueMetrics::default(),
    });

    Ok((
        EventSender {
            shared: shared.clone(),
        },
        EventReceiver {
            shared: shared.clone(),
        },
        QueueMonitor { shared },
    ))
}

/// Producer handle. Cloned once per source; when the last clone is dropped
/// the queue closes.
#[derive(Debug)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    /// Admit a record according to the overflow policy. Under `Block` this
    /// suspends while the queue is full; under `DropOldest` it never waits.
    pub async fn enqueue(&self, record: NormalizedRecord) -> Result<(), EnqueueError> {
        if self.shared.config.overflow_policy == OverflowPolicy::Block {
            match self.shared.slots.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(EnqueueError::Closed(record)),
            }
        }
        self.shared.push(record)
    }

    /// Non-waiting variant: `Full` under `Block` when no slot is free.
    pub fn try_enqueue(&self, record: NormalizedRecord) -> Result<(), EnqueueError> {
        if self.shared.config.overflow_policy == OverflowPolicy::Block {
            match self.shared.slots.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(tokio::sync::TryAcquireError::Closed) => {
                    return Err(EnqueueError::Closed(record));
                }
                Err(tokio::sync::TryAcquireError::NoPermits) => {
                    return Err(EnqueueError::Full(record));
                }
            }
        }
        self.shared.push(record)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

/// The single consumer side, owned by the delivery loop.
#[derive(Debug)]
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Wait for the next record. Returns `None` once the queue is closed and
    /// empty. Cancel-safe: dropping the future never loses a record.
    pub async fn recv(&mut self) -> Option<NormalizedRecord> {
        loop {
            if let Some(record) = self.shared.pop() {
                return Some(record);
            }
            if self.shared.state.lock().closed {
                // A record may have landed between the pop and the check.
                return self.shared.pop();
            }
            self.shared.not_empty.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<NormalizedRecord> {
        self.shared.pop()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn close(&self) {
        self.shared.close();
    }
}

/// Read-only view plus close control, for the orchestrator and observers.
#[derive(Debug, Clone)]
pub struct QueueMonitor {
    shared: Arc<Shared>,
}

impl QueueMonitor {
    pub fn depth(&self) -> usize {
        self.shared.metrics.depth()
    }

    pub fn bound(&self) -> usize {
        self.shared.config.bound
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.shared.config.overflow_policy
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.shared.metrics.snapshot(self.shared.config.bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> NormalizedRecord {
        NormalizedRecord::builder("test", format!("record {n}")).build()
    }

    fn queue(bound: usize, policy: OverflowPolicy) -> (EventSender, EventReceiver, QueueMonitor) {
        event_queue(QueueConfig {
            bound,
            overflow_policy: policy,
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_bounds() {
        for bound in [0, MAX_QUEUE_BOUND + 1] {
            let result = event_queue(QueueConfig {
                bound,
                overflow_policy: OverflowPolicy::Block,
            });
            assert!(matches!(result, Err(BufferError::InvalidCapacity(b)) if b == bound));
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx, _) = queue(8, OverflowPolicy::Block);
        for i in 0..5 {
            tx.enqueue(record(i)).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().message(), format!("record {i}"));
        }
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_try_enqueue_full_under_block() {
        let (tx, mut rx, monitor) = queue(2, OverflowPolicy::Block);
        tx.try_enqueue(record(0)).unwrap();
        tx.try_enqueue(record(1)).unwrap();
        let err = tx.try_enqueue(record(2)).unwrap_err();
        assert!(matches!(err, EnqueueError::Full(_)));
        assert_eq!(err.into_record().message(), "record 2");

        rx.try_recv().unwrap();
        tx.try_enqueue(record(3)).unwrap();
        assert_eq!(monitor.depth(), 2);
        assert_eq!(monitor.metrics().dropped, 0);
    }

    #[test]
    fn test_drop_oldest_evicts_head() {
        let (tx, mut rx, monitor) = queue(3, OverflowPolicy::DropOldest);
        for i in 0..5 {
            tx.try_enqueue(record(i)).unwrap();
        }
        let metrics = monitor.metrics();
        assert_eq!(metrics.dropped, 2);
        assert_eq!(metrics.depth, 3);
        assert_eq!(metrics.peak_depth, 3);
        let remaining: Vec<String> = std::iter::from_fn(|| rx.try_recv())
            .map(|r| r.message().to_string())
            .collect();
        assert_eq!(remaining, vec!["record 2", "record 3", "record 4"]);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (tx, mut rx, monitor) = queue(4, OverflowPolicy::Block);
        tx.enqueue(record(0)).await.unwrap();
        monitor.close();

        assert!(matches!(
            tx.enqueue(record(1)).await,
            Err(EnqueueError::Closed(_))
        ));
        assert_eq!(rx.recv().await.unwrap().message(), "record 0");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_last_sender_closes() {
        let (tx, mut rx, monitor) = queue(4, OverflowPolicy::Block);
        let tx2 = tx.clone();
        drop(tx);
        assert!(!monitor.is_closed());
        tx2.enqueue(record(7)).await.unwrap();
        drop(tx2);
        assert!(monitor.is_closed());
        assert_eq!(rx.recv().await.unwrap().message(), "record 7");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_enqueue() {
        let (tx, mut rx, _) = queue(4, OverflowPolicy::Block);
        let consumer = tokio::spawn(async move { rx.recv().await.map(|r| r.message().to_string()) });
        tokio::task::yield_now().await;
        tx.enqueue(record(1)).await.unwrap();
        assert_eq!(consumer.await.unwrap().as_deref(), Some("record 1"));
    }
}
