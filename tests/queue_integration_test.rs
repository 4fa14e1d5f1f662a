use siem_log_forwarder::buffer::{EnqueueError, OverflowPolicy, QueueConfig, event_queue};
use siem_log_forwarder::domain::NormalizedRecord;
use tokio_test::task::spawn;
use tokio_test::{assert_pending, assert_ready_ok};

fn record(n: usize) -> NormalizedRecord {
    NormalizedRecord::builder("test", format!("record {n}")).build()
}

fn config(bound: usize, overflow_policy: OverflowPolicy) -> QueueConfig {
    QueueConfig {
        bound,
        overflow_policy,
    }
}

#[test]
fn test_block_policy_suspends_eleventh_producer() {
    let (tx, mut rx, monitor) = event_queue(config(10, OverflowPolicy::Block)).unwrap();

    for i in 0..10 {
        let mut admitted = spawn(tx.enqueue(record(i)));
        assert_ready_ok!(admitted.poll());
    }
    assert_eq!(monitor.depth(), 10);

    let mut eleventh = spawn(tx.enqueue(record(10)));
    assert_pending!(eleventh.poll());
    assert_pending!(eleventh.poll());

    assert_eq!(rx.try_recv().unwrap().message(), "record 0");
    assert!(eleventh.is_woken());
    assert_ready_ok!(eleventh.poll());

    assert_eq!(monitor.depth(), 10);
    assert_eq!(monitor.metrics().dropped, 0);
}

#[test]
fn test_blocked_producers_resume_in_arrival_order() {
    let (tx, mut rx, _) = event_queue(config(1, OverflowPolicy::Block)).unwrap();
    tx.try_enqueue(record(0)).unwrap();

    let mut first = spawn(tx.enqueue(record(1)));
    let mut second = spawn(tx.enqueue(record(2)));
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    rx.try_recv().unwrap();
    assert_ready_ok!(first.poll());
    assert_pending!(second.poll());

    assert_eq!(rx.try_recv().unwrap().message(), "record 1");
    assert_ready_ok!(second.poll());
    assert_eq!(rx.try_recv().unwrap().message(), "record 2");
}

#[test]
fn test_drop_oldest_keeps_newest_records() {
    let (tx, mut rx, monitor) = event_queue(config(10, OverflowPolicy::DropOldest)).unwrap();

    for i in 1..=11 {
        let mut admitted = spawn(tx.enqueue(record(i)));
        assert_ready_ok!(admitted.poll());
    }

    let drained: Vec<String> = std::iter::from_fn(|| rx.try_recv())
        .map(|r| r.message().to_string())
        .collect();
    let expected: Vec<String> = (2..=11).map(|i| format!("record {i}")).collect();
    assert_eq!(drained, expected);
    assert_eq!(monitor.metrics().dropped, 1);
}

#[test]
fn test_close_wakes_blocked_producer() {
    let (tx, _rx, monitor) = event_queue(config(1, OverflowPolicy::Block)).unwrap();
    tx.try_enqueue(record(0)).unwrap();

    let mut blocked = spawn(tx.enqueue(record(1)));
    assert_pending!(blocked.poll());

    monitor.close();
    assert!(blocked.is_woken());
    match blocked.poll() {
        std::task::Poll::Ready(Err(EnqueueError::Closed(r))) => assert_eq!(r.message(), "record 1"),
        other => panic!("expected Closed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_many_producers_single_consumer() {
    let (tx, mut rx, monitor) = event_queue(config(16, OverflowPolicy::Block)).unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let tx = tx.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    tx.enqueue(record(p * 1000 + i)).await.unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    let consumer = tokio::spawn(async move {
        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        seen
    });

    for producer in producers {
        producer.await.unwrap();
    }
    assert_eq!(consumer.await.unwrap(), 400);

    let metrics = monitor.metrics();
    assert_eq!(metrics.enqueued, 400);
    assert_eq!(metrics.dequeued, 400);
    assert!(metrics.peak_depth <= 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_depth_gauge_matches_queue_under_contention() {
    let (tx, mut rx, monitor) = event_queue(config(4096, OverflowPolicy::Block)).unwrap();

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let tx = tx.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    tx.enqueue(record(p * 1000 + i)).await.unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    let consumer = tokio::spawn(async move {
        for _ in 0..3000 {
            rx.recv().await.unwrap();
        }
        rx
    });

    for producer in producers {
        producer.await.unwrap();
    }
    let mut rx = consumer.await.unwrap();
    assert_eq!(rx.len(), 1000);
    assert_eq!(monitor.depth(), rx.len());

    while rx.try_recv().is_some() {}
    assert_eq!(monitor.depth(), 0);
    assert_eq!(monitor.metrics().depth, 0);
}
