//! Delivery-contract tests for the stream-consumer worker.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use riskflow_core::bus::{DlqRecord, EventRecord, REASON_MAX_DELIVERIES_EXCEEDED};
use riskflow_core::streams::dlq_stream;
use riskflow_core::EventBus;
use riskflow_pipeline::worker::{HandlerError, HandlerFuture, MessageHandler, StreamWorker, WorkerConfig};
use riskflow_runtime::shutdown;
use riskflow_testing::InMemoryLogStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestMessage {
    body: String,
}

/// Fails the first `failures` deliveries, then succeeds. `-1` always fails.
struct FlakyHandler {
    failures: AtomicI64,
    calls: Arc<AtomicU64>,
}

impl FlakyHandler {
    fn new(failures: i64) -> (Self, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        (
            Self {
                failures: AtomicI64::new(failures),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl MessageHandler for FlakyHandler {
    type Message = TestMessage;

    fn handle<'a>(&'a self, _record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(());
            }
            if remaining > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
            }
            Err(HandlerError("scripted failure".to_string()))
        })
    }
}

fn worker_config(stream: &str, group: &str) -> WorkerConfig {
    WorkerConfig::new(stream, group, "c1")
        .with_block_ms(40)
        .with_retry_backoff(Duration::from_millis(10))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn always_failing_handler_routes_to_dlq_once() {
    let store = InMemoryLogStore::new();
    let bus = EventBus::new(Arc::new(store.clone()));
    let (handler, calls) = FlakyHandler::new(-1);

    bus.ensure_group("t-stream", "t-group").await.unwrap();
    let receipt = bus
        .publish("t-stream", &TestMessage { body: "x".into() })
        .await
        .unwrap();

    let worker = StreamWorker::new(
        worker_config("t-stream", "t-group").with_max_deliveries(3),
        bus.clone(),
        handler,
    );
    let (controller, signal) = shutdown::channel();
    let handle = tokio::spawn(worker.run(signal));

    let dlq_bus = bus.clone();
    wait_until(|| store.stream_len(&dlq_stream("t-stream")) >= 1).await;
    // Give the worker a beat to settle the ack and counter cleanup.
    tokio::time::sleep(Duration::from_millis(100)).await;

    controller.shutdown();
    handle.await.unwrap().unwrap();

    // Exactly one DLQ record with the exhaustion reason.
    let dlq = dlq_bus
        .read_recent::<DlqRecord>(&dlq_stream("t-stream"), 10)
        .await
        .unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].message.reason, REASON_MAX_DELIVERIES_EXCEEDED);
    assert_eq!(dlq[0].message.source_message_id, receipt.id);

    // Delivered exactly max_deliveries times, source message acked,
    // retry counter gone.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.pending_count("t-stream", "t-group"), 0);
    let retry_key = format!("riskflow:retries:t-stream:t-group:{}", receipt.id);
    assert!(!store.key_exists(&retry_key));
}

#[tokio::test]
async fn handler_succeeding_after_failures_is_acked_once() {
    let store = InMemoryLogStore::new();
    let bus = EventBus::new(Arc::new(store.clone()));
    let (handler, calls) = FlakyHandler::new(2);

    bus.ensure_group("t-stream", "t-group").await.unwrap();
    let receipt = bus
        .publish("t-stream", &TestMessage { body: "x".into() })
        .await
        .unwrap();

    let worker = StreamWorker::new(
        worker_config("t-stream", "t-group").with_max_deliveries(5),
        bus,
        handler,
    );
    let (controller, signal) = shutdown::channel();
    let handle = tokio::spawn(worker.run(signal));

    wait_until(|| store.pending_count("t-stream", "t-group") == 0 && calls.load(Ordering::SeqCst) >= 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    controller.shutdown();
    handle.await.unwrap().unwrap();

    // Two failures, one success; nothing dead-lettered, counter cleaned up.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.stream_len(&dlq_stream("t-stream")), 0);
    let retry_key = format!("riskflow:retries:t-stream:t-group:{}", receipt.id);
    assert!(!store.key_exists(&retry_key));
}

#[tokio::test]
async fn healthy_handler_drains_the_stream() {
    let store = InMemoryLogStore::new();
    let bus = EventBus::new(Arc::new(store.clone()));
    let (handler, calls) = FlakyHandler::new(0);

    bus.ensure_group("t-stream", "t-group").await.unwrap();
    for i in 0..5 {
        bus.publish(
            "t-stream",
            &TestMessage {
                body: format!("m{i}"),
            },
        )
        .await
        .unwrap();
    }

    let worker = StreamWorker::new(worker_config("t-stream", "t-group"), bus, handler);
    let (controller, signal) = shutdown::channel();
    let handle = tokio::spawn(worker.run(signal));

    wait_until(|| calls.load(Ordering::SeqCst) == 5).await;
    wait_until(|| store.pending_count("t-stream", "t-group") == 0).await;

    controller.shutdown();
    handle.await.unwrap().unwrap();
}
