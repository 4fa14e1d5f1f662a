//! Bounded event queue between source producers and the delivery loop.

pub mod backpressure;
pub mod metrics;
pub mod queue;

pub use backpressure::{BackpressureLevel, OverflowPolicy};
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use queue::{
    BufferError, EnqueueError, EventReceiver, EventSender, MAX_QUEUE_BOUND, QueueConfig,
    QueueMonitor, event_queue,
};
