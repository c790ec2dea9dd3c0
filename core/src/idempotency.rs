//! First-seen-wins idempotency markers.
//!
//! At-least-once delivery means the same raw input can arrive twice — from a
//! connector retry, a gateway client retry, or a re-delivered bus message.
//! The marker is an atomic set-if-absent keyed by `(stream, event_id)` with a
//! TTL much longer than end-to-end pipeline latency: whoever inserts it first
//! owns the publish, everyone else drops the duplicate without side effects.
//!
//! When a publish fails *after* a successful mark, the caller rolls the
//! marker back with [`IdempotencyStore::clear`] so a later retry of the same
//! raw input is not suppressed.

use crate::store::{LogStore, StoreError};
use std::sync::Arc;

/// Default marker TTL: one day, well above pipeline latency.
pub const DEFAULT_DEDUP_TTL_SECONDS: u64 = 86_400;

/// First-seen-wins marker store keyed by `(stream, event_id)`.
#[derive(Clone)]
pub struct IdempotencyStore {
    store: Arc<dyn LogStore>,
    ttl_seconds: u64,
}

impl IdempotencyStore {
    /// Create a marker store with the default TTL.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            ttl_seconds: DEFAULT_DEDUP_TTL_SECONDS,
        }
    }

    /// Override the marker TTL.
    #[must_use]
    pub const fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn marker_key(stream: &str, event_id: &str) -> String {
        format!("riskflow:dedup:{stream}:{event_id}")
    }

    /// Atomically mark `(stream, event_id)` as seen.
    ///
    /// Returns `true` iff this caller inserted the marker — i.e. the event is
    /// first-seen and the caller owns the publish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures; callers treat that as
    /// "unknown" and do not publish.
    pub async fn mark_if_first_seen(
        &self,
        stream: &str,
        event_id: &str,
    ) -> Result<bool, StoreError> {
        self.store
            .set_if_absent_with_ttl(&Self::marker_key(stream, event_id), "1", self.ttl_seconds)
            .await
    }

    /// Remove a marker, allowing a future attempt to proceed.
    ///
    /// Used to roll back when a publish fails after a successful mark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures.
    pub async fn clear(&self, stream: &str, event_id: &str) -> Result<(), StoreError> {
        self.store.del(&Self::marker_key(stream, event_id)).await
    }
}
