//! The event bus: typed publish/consume over a [`LogStore`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  publish   ┌──────────────┐  consume_group  ┌──────────┐
//! │  Producer  │──────────▶│   LogStore    │────────────────▶│  Worker  │
//! └────────────┘  (codec)   │ (stream+trim) │   (codec, ack)  └────┬─────┘
//!                           └──────────────┘                       │
//!                                  ▲                                │ exhausted /
//!                                  │ move_to_dlq                    │ undecodable
//!                                  └────────────────────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! **At-least-once**: a message delivered to a consumer group stays pending
//! until acked, and is re-delivered on subsequent reads. Consumers are made
//! behaviourally exactly-once at event-id granularity by the
//! [idempotency store](crate::idempotency::IdempotencyStore), not by the bus.
//!
//! Messages whose envelope cannot be decoded are routed to the group's
//! dead-letter stream and acked inside [`EventBus::consume_group`]; callers
//! only ever see well-formed records.
//!
//! # Trimming
//!
//! Publishes cap each stream at a configurable *approximate* maximum length.
//! Approximate trimming is deliberate: exact trimming defeats append
//! throughput on log stores that optimise for it.

use crate::codec::{self, CodecError};
use crate::store::{LogStore, RecordId, StoreError};
use crate::streams::dlq_stream;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Default approximate cap on stream length.
pub const DEFAULT_STREAM_MAX_LEN: u64 = 100_000;

/// Dead-letter reason for messages whose delivery count was exhausted.
pub const REASON_MAX_DELIVERIES_EXCEEDED: &str = "MAX_DELIVERIES_EXCEEDED";

/// Dead-letter reason for malformed log entries.
pub const REASON_BAD_ENCODING: &str = "BAD_ENCODING";

/// Errors from event bus operations.
#[derive(Error, Debug)]
pub enum BusError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The outgoing message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(CodecError),
}

/// A decoded record delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord<T> {
    /// Log-assigned id.
    pub id: RecordId,
    /// Stream the record was read from.
    pub stream: String,
    /// The decoded message.
    pub message: T,
    /// Publish timestamp recorded by the codec, ISO-8601.
    pub published_at_utc: String,
}

/// The receipt returned by [`EventBus::publish`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecord {
    /// Log-assigned id.
    pub id: RecordId,
    /// Stream the record was appended to.
    pub stream: String,
    /// Publish timestamp, ISO-8601.
    pub published_at_utc: String,
}

/// Parameters for a blocking consumer-group read.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeRequest<'a> {
    /// Stream to read.
    pub stream: &'a str,
    /// Consumer group.
    pub group: &'a str,
    /// Consumer name within the group.
    pub consumer: &'a str,
    /// Maximum messages per read.
    pub count: usize,
    /// How long the read may block waiting for new messages.
    pub block_ms: u64,
}

/// Parameters for routing a message to a dead-letter stream.
#[derive(Debug, Clone)]
pub struct DlqRequest<'a> {
    /// Stream the message failed on.
    pub source_stream: &'a str,
    /// Log id of the failed message.
    pub source_message_id: &'a str,
    /// Machine-readable reason, e.g. [`REASON_MAX_DELIVERIES_EXCEEDED`].
    pub reason: &'a str,
    /// The failed payload, as far as it could be recovered.
    pub payload: serde_json::Value,
    /// Structured failure metadata (group, consumer, delivery count, error).
    pub metadata: serde_json::Value,
}

/// The record shape appended to dead-letter streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqRecord {
    /// Stream the message failed on.
    pub source_stream: String,
    /// Log id of the failed message.
    pub source_message_id: String,
    /// Machine-readable failure reason.
    pub reason: String,
    /// The failed payload, as far as it could be recovered.
    pub payload: serde_json::Value,
    /// Structured failure metadata.
    pub metadata: serde_json::Value,
    /// When the message was routed here, ISO-8601.
    pub failed_at_utc: String,
}

/// Typed publish/consume surface over an [`Arc<dyn LogStore>`].
///
/// Cheap to clone; every clone shares the store handle, which must be safe
/// for concurrent use.
#[derive(Clone)]
pub struct EventBus {
    store: Arc<dyn LogStore>,
    stream_max_len: u64,
}

impl EventBus {
    /// Create a bus with the default approximate stream cap.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            stream_max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }

    /// Override the approximate stream cap.
    #[must_use]
    pub const fn with_stream_max_len(mut self, max_len: u64) -> Self {
        self.stream_max_len = max_len;
        self
    }

    /// Access the underlying store (idempotency and state stores share it).
    #[must_use]
    pub fn store(&self) -> Arc<dyn LogStore> {
        Arc::clone(&self.store)
    }

    /// Encode and append a message, trimming the stream approximately.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Encode`] for unserialisable messages and
    /// [`BusError::Store`] for transport failures.
    pub async fn publish<T: Serialize>(
        &self,
        stream: &str,
        message: &T,
    ) -> Result<PublishedRecord, BusError> {
        let published_at = Utc::now();
        let fields = codec::encode(message, published_at).map_err(BusError::Encode)?;

        let id = self
            .store
            .append(stream, fields, Some(self.stream_max_len))
            .await?;

        tracing::debug!(stream, id = %id, "message published");
        metrics::counter!("riskflow.bus.published", "stream" => stream.to_string()).increment(1);

        Ok(PublishedRecord {
            id,
            stream: stream.to_string(),
            published_at_utc: published_at.to_rfc3339(),
        })
    }

    /// Read the most recent `count` records, newest first.
    ///
    /// Operational surfaces only (dashboards, demos); transformers always go
    /// through [`Self::consume_group`]. Undecodable entries are skipped with
    /// a warning rather than routed, since no consumer group owns them here.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] for transport failures.
    pub async fn read_recent<T: DeserializeOwned>(
        &self,
        stream: &str,
        count: usize,
    ) -> Result<Vec<EventRecord<T>>, BusError> {
        let entries = self.store.read_recent(stream, count).await?;

        let mut records = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            match codec::decode::<T>(&fields) {
                Ok(envelope) => records.push(EventRecord {
                    id,
                    stream: stream.to_string(),
                    message: envelope.message,
                    published_at_utc: envelope.published_at_utc,
                }),
                Err(e) => {
                    tracing::warn!(stream, id = %id, error = %e, "skipping undecodable record");
                }
            }
        }
        Ok(records)
    }

    /// Idempotently create a consumer group starting at the stream tail.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] for transport failures; "already exists"
    /// is swallowed by the store.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        self.store.create_group(stream, group).await?;
        Ok(())
    }

    /// Blocking read of up to `count` new messages as a group consumer.
    ///
    /// Entries whose envelope cannot be decoded are routed to the group's
    /// dead-letter stream with reason [`REASON_BAD_ENCODING`] and acked; they
    /// are never surfaced to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] for transport failures.
    pub async fn consume_group<T: DeserializeOwned>(
        &self,
        request: ConsumeRequest<'_>,
    ) -> Result<Vec<EventRecord<T>>, BusError> {
        let entries = self
            .store
            .read_group(
                request.stream,
                request.group,
                request.consumer,
                request.count,
                request.block_ms,
            )
            .await?;

        self.decode_group_entries(request.stream, request.group, request.consumer, entries)
            .await
    }

    /// Claim messages that have sat pending for at least `min_idle_ms` —
    /// typically stranded by a crashed consumer — re-assigning them to
    /// `consumer`. Decoding failures are dead-lettered exactly as in
    /// [`Self::consume_group`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] for transport failures.
    pub async fn claim_pending<T: DeserializeOwned>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<EventRecord<T>>, BusError> {
        let entries = self
            .store
            .claim_pending(stream, group, consumer, min_idle_ms, count)
            .await?;

        self.decode_group_entries(stream, group, consumer, entries).await
    }

    async fn decode_group_entries<T: DeserializeOwned>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        entries: Vec<crate::store::RawEntry>,
    ) -> Result<Vec<EventRecord<T>>, BusError> {
        let mut records = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            match codec::decode::<T>(&fields) {
                Ok(envelope) => records.push(EventRecord {
                    id,
                    stream: stream.to_string(),
                    message: envelope.message,
                    published_at_utc: envelope.published_at_utc,
                }),
                Err(e) => {
                    // Malformed entries bypass the retry counter: re-delivery
                    // cannot fix an envelope that never decodes.
                    tracing::warn!(
                        stream,
                        group,
                        id = %id,
                        error = %e,
                        "undecodable entry routed to dead-letter stream"
                    );
                    self.move_to_dlq(DlqRequest {
                        source_stream: stream,
                        source_message_id: &id,
                        reason: REASON_BAD_ENCODING,
                        payload: serde_json::json!(fields),
                        metadata: serde_json::json!({
                            "group": group,
                            "consumer": consumer,
                            "error": e.to_string(),
                        }),
                    })
                    .await?;
                    self.ack(stream, group, &[id]).await?;
                }
            }
        }
        Ok(records)
    }

    /// Acknowledge messages for a consumer group.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] for transport failures.
    pub async fn ack(
        &self,
        stream: &str,
        group: &str,
        ids: &[RecordId],
    ) -> Result<(), BusError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.ack(stream, group, ids).await?;
        Ok(())
    }

    /// Append a failed message to `{source_stream}.dlq` with structured
    /// failure metadata.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Store`] if the dead-letter append itself fails.
    pub async fn move_to_dlq(&self, request: DlqRequest<'_>) -> Result<PublishedRecord, BusError> {
        let record = DlqRecord {
            source_stream: request.source_stream.to_string(),
            source_message_id: request.source_message_id.to_string(),
            reason: request.reason.to_string(),
            payload: request.payload,
            metadata: request.metadata,
            failed_at_utc: Utc::now().to_rfc3339(),
        };

        let target = dlq_stream(request.source_stream);
        let receipt = self.publish(&target, &record).await?;

        tracing::warn!(
            source_stream = request.source_stream,
            source_message_id = request.source_message_id,
            reason = request.reason,
            dlq_stream = %target,
            "message routed to dead-letter stream"
        );
        metrics::counter!(
            "riskflow.bus.dlq_routed",
            "stream" => request.source_stream.to_string(),
            "reason" => request.reason.to_string()
        )
        .increment(1);

        Ok(receipt)
    }
}
