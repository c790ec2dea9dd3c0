//! The log store contract consumed by the event bus.
//!
//! A [`LogStore`] is an append-only, consumer-group-capable log plus a small
//! set of atomic key operations (`SET NX EX`, `INCR`, `EXPIRE`, `DEL` and
//! plain GET/SET). The production implementation is Redis Streams
//! (`riskflow-redis`); tests run against the in-process store in
//! `riskflow-testing`.
//!
//! # Dyn compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the trait can be used as `Arc<dyn LogStore>` — the bus, the idempotency
//! store, and every worker share one store handle per process.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A log-assigned record identifier, monotonically increasing within a stream.
pub type RecordId = String;

/// The flat field record appended to the log for one entry.
pub type FieldList = Vec<(String, String)>;

/// A raw entry read back from the log: id plus field map.
pub type RawEntry = (RecordId, HashMap<String, String>);

/// Future type returned by [`LogStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors from log store operations. All variants are transient from the
/// pipeline's point of view; callers retry with backoff.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not reach or authenticate with the store.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An append was rejected.
    #[error("append failed for stream '{stream}': {reason}")]
    AppendFailed {
        /// The stream that rejected the append.
        stream: String,
        /// The reason reported by the store.
        reason: String,
    },

    /// A consumer-group operation failed.
    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    /// A key operation failed.
    #[error("key operation failed: {0}")]
    KeyOp(String),

    /// Network or protocol error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Append-only log with consumer groups and atomic key operations.
pub trait LogStore: Send + Sync {
    /// Append a field record to a stream, optionally trimming the stream to
    /// an approximate maximum length. Returns the assigned id.
    fn append(
        &self,
        stream: &str,
        fields: FieldList,
        approx_max_len: Option<u64>,
    ) -> StoreFuture<'_, RecordId>;

    /// Read the most recent `count` entries in reverse chronological order.
    fn read_recent(&self, stream: &str, count: usize) -> StoreFuture<'_, Vec<RawEntry>>;

    /// Idempotently create a consumer group starting at the stream tail.
    /// "Group already exists" is not an error.
    fn create_group(&self, stream: &str, group: &str) -> StoreFuture<'_, ()>;

    /// Blocking read of up to `count` messages as `consumer` in `group`.
    ///
    /// New messages are delivered first to whichever consumer asks; a message
    /// stays in the group's pending list until acked, and implementations
    /// re-deliver pending messages on subsequent reads so a failed handler
    /// sees the message again.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> StoreFuture<'_, Vec<RawEntry>>;

    /// Acknowledge messages, removing them from the group's pending list.
    fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> StoreFuture<'_, ()>;

    /// Claim up to `count` pending messages that have been idle for at least
    /// `min_idle_ms`, re-assigning them to `consumer`. Used to recover
    /// messages stranded by a crashed consumer.
    fn claim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> StoreFuture<'_, Vec<RawEntry>>;

    /// Atomic set-if-absent with expiry. Returns `true` iff this caller
    /// inserted the key.
    fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreFuture<'_, bool>;

    /// Atomically increment a counter key, returning the new value.
    fn incr(&self, key: &str) -> StoreFuture<'_, i64>;

    /// Set a key's time-to-live.
    fn expire(&self, key: &str, ttl_seconds: u64) -> StoreFuture<'_, ()>;

    /// Delete a key.
    fn del(&self, key: &str) -> StoreFuture<'_, ()>;

    /// Read a plain value key.
    fn get_value(&self, key: &str) -> StoreFuture<'_, Option<String>>;

    /// Write a plain value key.
    fn put_value(&self, key: &str, value: &str) -> StoreFuture<'_, ()>;
}
