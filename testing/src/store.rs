//! In-memory [`LogStore`] implementation.

use riskflow_core::store::{FieldList, LogStore, RawEntry, RecordId, StoreError, StoreFuture};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How often a blocked group read re-checks for new messages.
const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct Entry {
    offset: u64,
    id: RecordId,
    fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
struct PendingState {
    offset: u64,
    delivered_at: Instant,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Absolute offset of the next never-delivered entry.
    cursor: u64,
    /// Delivered-but-unacked entries, by record id.
    pending: BTreeMap<RecordId, PendingState>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: VecDeque<Entry>,
    next_offset: u64,
    last_id_ms: i64,
    last_id_seq: u64,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    fn mint_id(&mut self) -> RecordId {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if now_ms > self.last_id_ms {
            self.last_id_ms = now_ms;
            self.last_id_seq = 0;
        } else {
            self.last_id_seq += 1;
        }
        format!("{}-{}", self.last_id_ms, self.last_id_seq)
    }
}

#[derive(Debug, Clone)]
struct KeyEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KeyEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, StreamState>,
    keys: HashMap<String, KeyEntry>,
}

impl Inner {
    fn live_key(&mut self, key: &str) -> Option<&mut KeyEntry> {
        if self.keys.get(key).is_some_and(KeyEntry::is_expired) {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }
}

/// In-process [`LogStore`] with the same observable semantics as the
/// production Redis store: ordered streams, approximate length trimming,
/// tail-starting consumer groups with pending-entry re-delivery, and TTL'd
/// atomic key operations.
///
/// Cheap to clone; clones share state. Locks are never held across awaits;
/// blocking group reads poll under short critical sections.
#[derive(Clone, Default)]
pub struct InMemoryLogStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryLogStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of a stream (test assertions).
    #[must_use]
    pub fn stream_len(&self, stream: &str) -> usize {
        let inner = self.lock();
        inner.streams.get(stream).map_or(0, |s| s.entries.len())
    }

    /// Number of unacked pending entries for a group (test assertions).
    #[must_use]
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        let inner = self.lock();
        inner
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Whether a key currently exists and is unexpired (test assertions).
    #[must_use]
    pub fn key_exists(&self, key: &str) -> bool {
        let mut inner = self.lock();
        inner.live_key(key).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex only happens when a test thread panicked while
        // holding the lock; propagating the inner state is still sound here.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn try_read_group(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let mut inner = self.lock();
        let state = inner.streams.entry(stream.to_string()).or_default();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Err(StoreError::ConsumerGroup(format!(
                "no such group '{group}' for stream '{stream}'"
            )));
        };

        let mut delivered = Vec::new();

        // Pending entries first, in log order: a failed handler must see its
        // message again on the next blocking read.
        let mut pending: Vec<(u64, RecordId)> = group_state
            .pending
            .iter()
            .map(|(id, p)| (p.offset, id.clone()))
            .collect();
        pending.sort_unstable_by_key(|(offset, _)| *offset);
        for (_, id) in pending {
            if delivered.len() >= count {
                break;
            }
            if let Some(entry) = state.entries.iter().find(|e| e.id == id) {
                if let Some(p) = group_state.pending.get_mut(&id) {
                    p.delivered_at = Instant::now();
                }
                delivered.push((entry.id.clone(), entry.fields.clone()));
            } else {
                // Trimmed away while pending; nothing left to deliver.
                group_state.pending.remove(&id);
            }
        }

        // Then new entries from the group cursor.
        while delivered.len() < count {
            let Some(entry) = state
                .entries
                .iter()
                .find(|e| e.offset >= group_state.cursor)
            else {
                break;
            };
            group_state.cursor = entry.offset + 1;
            group_state.pending.insert(
                entry.id.clone(),
                PendingState {
                    offset: entry.offset,
                    delivered_at: Instant::now(),
                },
            );
            delivered.push((entry.id.clone(), entry.fields.clone()));
        }

        Ok(delivered)
    }

    fn try_claim_pending(
        &self,
        stream: &str,
        group: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<RawEntry>, StoreError> {
        let mut inner = self.lock();
        let state = inner.streams.entry(stream.to_string()).or_default();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Err(StoreError::ConsumerGroup(format!(
                "no such group '{group}' for stream '{stream}'"
            )));
        };

        let min_idle = Duration::from_millis(min_idle_ms);
        let mut idle: Vec<(u64, RecordId)> = group_state
            .pending
            .iter()
            .filter(|(_, p)| p.delivered_at.elapsed() >= min_idle)
            .map(|(id, p)| (p.offset, id.clone()))
            .collect();
        idle.sort_unstable_by_key(|(offset, _)| *offset);

        let mut claimed = Vec::new();
        for (_, id) in idle.into_iter().take(count) {
            if let Some(entry) = state.entries.iter().find(|e| e.id == id) {
                if let Some(p) = group_state.pending.get_mut(&id) {
                    p.delivered_at = Instant::now();
                }
                claimed.push((entry.id.clone(), entry.fields.clone()));
            } else {
                group_state.pending.remove(&id);
            }
        }
        Ok(claimed)
    }
}

impl LogStore for InMemoryLogStore {
    fn append(
        &self,
        stream: &str,
        fields: FieldList,
        approx_max_len: Option<u64>,
    ) -> StoreFuture<'_, RecordId> {
        let stream = stream.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            let state = inner.streams.entry(stream).or_default();
            let id = state.mint_id();
            let offset = state.next_offset;
            state.next_offset += 1;
            state.entries.push_back(Entry {
                offset,
                id: id.clone(),
                fields: fields.into_iter().collect(),
            });

            if let Some(max_len) = approx_max_len {
                // Approximate semantics: trim down to the cap on overflow.
                while state.entries.len() as u64 > max_len {
                    state.entries.pop_front();
                }
            }

            Ok(id)
        })
    }

    fn read_recent(&self, stream: &str, count: usize) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        Box::pin(async move {
            let inner = self.lock();
            let Some(state) = inner.streams.get(&stream) else {
                return Ok(Vec::new());
            };
            Ok(state
                .entries
                .iter()
                .rev()
                .take(count)
                .map(|e| (e.id.clone(), e.fields.clone()))
                .collect())
        })
    }

    fn create_group(&self, stream: &str, group: &str) -> StoreFuture<'_, ()> {
        let stream = stream.to_string();
        let group = group.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            let state = inner.streams.entry(stream).or_default();
            let tail = state.next_offset;
            state.groups.entry(group).or_insert_with(|| GroupState {
                cursor: tail,
                pending: BTreeMap::new(),
            });
            Ok(())
        })
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        Box::pin(async move {
            let deadline = Instant::now() + Duration::from_millis(block_ms);
            loop {
                let delivered = self.try_read_group(&stream, &group, count)?;
                if !delivered.is_empty() || Instant::now() >= deadline {
                    return Ok(delivered);
                }
                tokio::time::sleep(BLOCK_POLL_INTERVAL).await;
            }
        })
    }

    fn claim_pending(
        &self,
        stream: &str,
        group: &str,
        _consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        Box::pin(async move { self.try_claim_pending(&stream, &group, min_idle_ms, count) })
    }

    fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> StoreFuture<'_, ()> {
        let stream = stream.to_string();
        let group = group.to_string();
        let ids = ids.to_vec();
        Box::pin(async move {
            let mut inner = self.lock();
            if let Some(group_state) = inner
                .streams
                .get_mut(&stream)
                .and_then(|s| s.groups.get_mut(&group))
            {
                for id in &ids {
                    group_state.pending.remove(id);
                }
            }
            Ok(())
        })
    }

    fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.live_key(&key).is_some() {
                return Ok(false);
            }
            inner.keys.insert(
                key,
                KeyEntry {
                    value,
                    expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
                },
            );
            Ok(true)
        })
    }

    fn incr(&self, key: &str) -> StoreFuture<'_, i64> {
        let key = key.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            if let Some(entry) = inner.live_key(&key) {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::KeyOp(format!("key '{key}' is not an integer")))?;
                entry.value = (current + 1).to_string();
                return Ok(current + 1);
            }
            inner.keys.insert(
                key,
                KeyEntry {
                    value: "1".to_string(),
                    expires_at: None,
                },
            );
            Ok(1)
        })
    }

    fn expire(&self, key: &str, ttl_seconds: u64) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            if let Some(entry) = inner.live_key(&key) {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
            }
            Ok(())
        })
    }

    fn del(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.keys.remove(&key);
            Ok(())
        })
    }

    fn get_value(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            Ok(inner.live_key(&key).map(|e| e.value.clone()))
        })
    }

    fn put_value(&self, key: &str, value: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.keys.insert(
                key,
                KeyEntry {
                    value,
                    expires_at: None,
                },
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn fields(v: &str) -> FieldList {
        vec![("payload".to_string(), v.to_string())]
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = InMemoryLogStore::new();
        let a = store.append("s", fields("a"), None).await.unwrap();
        let b = store.append("s", fields("b"), None).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.stream_len("s"), 2);
    }

    #[tokio::test]
    async fn approx_trim_caps_length() {
        let store = InMemoryLogStore::new();
        for i in 0..10 {
            store
                .append("s", fields(&i.to_string()), Some(4))
                .await
                .unwrap();
        }
        assert_eq!(store.stream_len("s"), 4);
    }

    #[tokio::test]
    async fn group_starts_at_tail() {
        let store = InMemoryLogStore::new();
        store.append("s", fields("before"), None).await.unwrap();
        store.create_group("s", "g").await.unwrap();
        store.append("s", fields("after"), None).await.unwrap();

        let read = store.read_group("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].1.get("payload").map(String::as_str), Some("after"));
    }

    #[tokio::test]
    async fn unacked_messages_are_redelivered() {
        let store = InMemoryLogStore::new();
        store.create_group("s", "g").await.unwrap();
        store.append("s", fields("m"), None).await.unwrap();

        let first = store.read_group("s", "g", "c1", 10, 0).await.unwrap();
        let second = store.read_group("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(first, second);

        let ids: Vec<RecordId> = first.iter().map(|(id, _)| id.clone()).collect();
        store.ack("s", "g", &ids).await.unwrap();
        assert!(store.read_group("s", "g", "c1", 10, 0).await.unwrap().is_empty());
        assert_eq!(store.pending_count("s", "g"), 0);
    }

    #[tokio::test]
    async fn groups_share_delivery_cursor() {
        let store = InMemoryLogStore::new();
        store.create_group("s", "g").await.unwrap();
        store.append("s", fields("m1"), None).await.unwrap();
        store.append("s", fields("m2"), None).await.unwrap();

        let batch = store.read_group("s", "g", "c1", 1, 0).await.unwrap();
        assert_eq!(batch.len(), 1);
        // Second consumer in the same group gets the pending entry plus the
        // next new one — competitive delivery is per group, not per consumer.
        let rest = store.read_group("s", "g", "c2", 10, 0).await.unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn set_if_absent_is_first_seen_wins() {
        let store = InMemoryLogStore::new();
        assert!(store.set_if_absent_with_ttl("k", "1", 60).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", "1", 60).await.unwrap());
        store.del("k").await.unwrap();
        assert!(store.set_if_absent_with_ttl("k", "1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn incr_counts_from_one() {
        let store = InMemoryLogStore::new();
        assert_eq!(store.incr("n").await.unwrap(), 1);
        assert_eq!(store.incr("n").await.unwrap(), 2);
        store.del("n").await.unwrap();
        assert_eq!(store.incr("n").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blocking_read_times_out_empty() {
        let store = InMemoryLogStore::new();
        store.create_group("s", "g").await.unwrap();
        let start = Instant::now();
        let read = store.read_group("s", "g", "c1", 1, 30).await.unwrap();
        assert!(read.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
