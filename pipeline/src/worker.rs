//! The generic stream-consumer worker.
//!
//! One worker instance drives one `(stream, group, consumer)` triple with a
//! per-message handler:
//!
//! ```text
//! ensure_group(stream, group)
//! while running:
//!   msgs ← consume_group(batch_size, block_ms)
//!   for msg in msgs:
//!     handler(msg) ──ok──▶ ack, delete retry counter
//!              └──err──▶ retries ← INCR counter (EXPIRE on first)
//!                         retries ≥ max_deliveries ? DLQ + ack + delete counter
//!                                                  : backoff, message stays pending
//! ```
//!
//! The retry counter is external to the log and is the authoritative
//! delivery count; the log's own pending list only makes the message visible
//! again on the next blocking read. Handlers must not wrap their own work in
//! retries — the worker already owns that budget.

use riskflow_core::bus::{
    BusError, ConsumeRequest, DlqRequest, EventRecord, REASON_MAX_DELIVERIES_EXCEEDED,
};
use riskflow_core::store::LogStore;
use riskflow_core::EventBus;
use riskflow_runtime::shutdown::ShutdownSignal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A business-logic failure inside a handler; drives the retry-counter path.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Wrap any displayable error.
    #[must_use]
    pub fn from_display(e: impl std::fmt::Display) -> Self {
        Self(e.to_string())
    }
}

/// Future type returned by [`MessageHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Per-message handler a [`StreamWorker`] drives.
pub trait MessageHandler: Send + Sync {
    /// The message type read from the stream.
    type Message: Serialize + DeserializeOwned + Send + Sync;

    /// Process one delivered record. An `Err` counts one delivery attempt.
    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a>;
}

/// Configuration of one worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stream to consume.
    pub stream: String,
    /// Consumer group.
    pub group: String,
    /// Consumer name within the group.
    pub consumer: String,
    /// Maximum messages per blocking read.
    pub batch_size: usize,
    /// How long a read may block waiting for new messages.
    pub block_ms: u64,
    /// Deliveries before a message is dead-lettered.
    pub max_deliveries: u32,
    /// Sleep after a failed (non-final) delivery; the message stays pending.
    pub retry_backoff: Duration,
    /// TTL on retry-counter keys, so counters are garbage-collected after a
    /// message reaches its terminal outcome.
    pub retry_key_ttl_seconds: u64,
}

impl WorkerConfig {
    /// A worker config with the default batch, retry and TTL settings.
    #[must_use]
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            batch_size: 16,
            block_ms: 5_000,
            max_deliveries: 3,
            retry_backoff: Duration::from_millis(500),
            retry_key_ttl_seconds: 3_600,
        }
    }

    /// Override the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the blocking read timeout.
    #[must_use]
    pub const fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    /// Override the delivery budget.
    #[must_use]
    pub const fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries;
        self
    }

    /// Override the post-failure backoff.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Override the retry-counter TTL.
    #[must_use]
    pub const fn with_retry_key_ttl_seconds(mut self, ttl: u64) -> Self {
        self.retry_key_ttl_seconds = ttl;
        self
    }
}

/// Errors that stop a worker from starting.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The consumer group could not be created.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Generic consumer-group loop with retry counting and dead-letter routing.
pub struct StreamWorker<H: MessageHandler> {
    config: WorkerConfig,
    bus: EventBus,
    store: Arc<dyn LogStore>,
    handler: H,
}

impl<H: MessageHandler> StreamWorker<H> {
    /// Build a worker over the shared bus.
    #[must_use]
    pub fn new(config: WorkerConfig, bus: EventBus, handler: H) -> Self {
        let store = bus.store();
        Self {
            config,
            bus,
            store,
            handler,
        }
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!(
            "riskflow:retries:{}:{}:{}",
            self.config.stream, self.config.group, message_id
        )
    }

    /// Run until shutdown. The shutdown flag is polled between batches;
    /// a batch in flight is drained before the loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Bus`] if the consumer group cannot be created
    /// at startup. Runtime bus errors are logged and retried, never fatal.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        self.bus
            .ensure_group(&self.config.stream, &self.config.group)
            .await?;

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.config.consumer,
            max_deliveries = self.config.max_deliveries,
            "worker started"
        );

        while !shutdown.is_shutdown() {
            let request = ConsumeRequest {
                stream: &self.config.stream,
                group: &self.config.group,
                consumer: &self.config.consumer,
                count: self.config.batch_size,
                block_ms: self.config.block_ms,
            };

            let records = match self.bus.consume_group::<H::Message>(request).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        stream = %self.config.stream,
                        group = %self.config.group,
                        error = %e,
                        "consume failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for record in records {
                self.process_one(&record).await;
            }
        }

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            "worker stopped"
        );
        Ok(())
    }

    /// Deliver one record to the handler and settle its outcome.
    async fn process_one(&self, record: &EventRecord<H::Message>) {
        let retry_key = self.retry_key(&record.id);

        match self.handler.handle(record).await {
            Ok(()) => {
                self.settle_success(record, &retry_key).await;
            }
            Err(e) => {
                self.settle_failure(record, &retry_key, &e).await;
            }
        }
    }

    async fn settle_success(&self, record: &EventRecord<H::Message>, retry_key: &str) {
        if let Err(e) = self
            .bus
            .ack(&self.config.stream, &self.config.group, &[record.id.clone()])
            .await
        {
            // Left pending: the message will be re-delivered and the handler
            // must tolerate the duplicate.
            tracing::warn!(
                stream = %self.config.stream,
                id = %record.id,
                error = %e,
                "ack failed after successful handle"
            );
            return;
        }
        if let Err(e) = self.store.del(retry_key).await {
            tracing::debug!(key = retry_key, error = %e, "retry counter cleanup failed");
        }
        metrics::counter!("riskflow.worker.handled", "group" => self.config.group.clone())
            .increment(1);
    }

    async fn settle_failure(
        &self,
        record: &EventRecord<H::Message>,
        retry_key: &str,
        error: &HandlerError,
    ) {
        metrics::counter!("riskflow.worker.failed", "group" => self.config.group.clone())
            .increment(1);

        let deliveries = match self.store.incr(retry_key).await {
            Ok(n) => n,
            Err(e) => {
                // Counter unavailable: leave the message pending so it is
                // re-delivered; no delivery is ever silently discarded.
                tracing::warn!(
                    stream = %self.config.stream,
                    id = %record.id,
                    error = %e,
                    "retry counter unavailable, leaving message pending"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                return;
            }
        };

        if deliveries == 1 {
            if let Err(e) = self
                .store
                .expire(retry_key, self.config.retry_key_ttl_seconds)
                .await
            {
                tracing::debug!(key = retry_key, error = %e, "retry counter expire failed");
            }
        }

        if deliveries >= i64::from(self.config.max_deliveries) {
            self.route_to_dlq(record, retry_key, deliveries, error).await;
        } else {
            tracing::warn!(
                stream = %self.config.stream,
                id = %record.id,
                deliveries,
                max_deliveries = self.config.max_deliveries,
                error = %error,
                "handler failed, message stays pending"
            );
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    async fn route_to_dlq(
        &self,
        record: &EventRecord<H::Message>,
        retry_key: &str,
        deliveries: i64,
        error: &HandlerError,
    ) {
        let payload = serde_json::to_value(&record.message).unwrap_or(serde_json::Value::Null);
        let dlq_result = self
            .bus
            .move_to_dlq(DlqRequest {
                source_stream: &self.config.stream,
                source_message_id: &record.id,
                reason: REASON_MAX_DELIVERIES_EXCEEDED,
                payload,
                metadata: serde_json::json!({
                    "group": self.config.group,
                    "consumer": self.config.consumer,
                    "deliveries": deliveries,
                    "error": error.to_string(),
                }),
            })
            .await;

        if let Err(e) = dlq_result {
            // Leave the message pending rather than lose it; routing is
            // retried on the next delivery.
            tracing::error!(
                stream = %self.config.stream,
                id = %record.id,
                error = %e,
                "dead-letter routing failed, leaving message pending"
            );
            return;
        }

        if let Err(e) = self
            .bus
            .ack(&self.config.stream, &self.config.group, &[record.id.clone()])
            .await
        {
            tracing::warn!(
                stream = %self.config.stream,
                id = %record.id,
                error = %e,
                "ack failed after dead-letter routing"
            );
            return;
        }

        if let Err(e) = self.store.del(retry_key).await {
            tracing::debug!(key = retry_key, error = %e, "retry counter cleanup failed");
        }
    }
}
