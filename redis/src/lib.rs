//! Redis Streams implementation of the Riskflow log store contract.
//!
//! This crate provides [`RedisLogStore`], the production
//! [`LogStore`](riskflow_core::store::LogStore) backing the event bus:
//!
//! - **Streams**: `XADD` with approximate `MAXLEN ~` trimming, `XREVRANGE`
//!   for tail reads.
//! - **Consumer groups**: `XGROUP CREATE … MKSTREAM` (the `BUSYGROUP` reply
//!   is swallowed, making creation idempotent), `XREADGROUP … BLOCK` with
//!   the `>` cursor, `XACK`. Crash recovery rides on the pending entries
//!   list: unacked messages are re-delivered when a consumer reads again.
//! - **Atomic key ops**: `SET NX EX`, `INCR`, `EXPIRE`, `DEL`, plain
//!   `GET`/`SET` — the substrate for idempotency markers, retry counters,
//!   and connector state.
//!
//! Connections are pooled through [`ConnectionManager`]; the store is cheap
//! to clone and safe for concurrent use, so one handle per process is shared
//! by every publisher and consumer.
//!
//! # Example
//!
//! ```no_run
//! use riskflow_redis::RedisLogStore;
//! use riskflow_core::EventBus;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisLogStore::connect("redis://127.0.0.1:6379").await?;
//! let bus = EventBus::new(Arc::new(store));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamMaxlen, StreamPendingCountReply, StreamRangeReply,
    StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use riskflow_core::store::{FieldList, LogStore, RawEntry, RecordId, StoreError, StoreFuture};
use std::collections::HashMap;

/// Redis Streams log store.
///
/// Every clone shares the same [`ConnectionManager`] (connection pool).
#[derive(Clone)]
pub struct RedisLogStore {
    conn_manager: ConnectionManager,
}

impl RedisLogStore {
    /// Connect to Redis and build the connection manager.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(format!("invalid redis url: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::ConnectionFailed(format!("failed to create connection manager: {e}"))
        })?;

        tracing::info!(url = redis_url, "connected to redis log store");

        Ok(Self { conn_manager })
    }

    fn transport(e: &redis::RedisError) -> StoreError {
        StoreError::Transport(e.to_string())
    }

    fn entry_from(stream_id: StreamId) -> RawEntry {
        let mut fields = HashMap::with_capacity(stream_id.map.len());
        for (name, value) in stream_id.map {
            if let Ok(text) = redis::from_redis_value::<String>(&value) {
                fields.insert(name, text);
            }
        }
        (stream_id.id, fields)
    }
}

impl LogStore for RedisLogStore {
    fn append(
        &self,
        stream: &str,
        fields: FieldList,
        approx_max_len: Option<u64>,
    ) -> StoreFuture<'_, RecordId> {
        let stream = stream.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let result: Result<String, redis::RedisError> = match approx_max_len {
                Some(max_len) => {
                    let max_len = usize::try_from(max_len).unwrap_or(usize::MAX);
                    conn.xadd_maxlen(&stream, StreamMaxlen::Approx(max_len), "*", &fields)
                        .await
                }
                None => conn.xadd(&stream, "*", &fields).await,
            };

            result.map_err(|e| StoreError::AppendFailed {
                stream: stream.clone(),
                reason: e.to_string(),
            })
        })
    }

    fn read_recent(&self, stream: &str, count: usize) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let reply: StreamRangeReply = conn
                .xrevrange_count(&stream, "+", "-", count)
                .await
                .map_err(|e| Self::transport(&e))?;

            Ok(reply.ids.into_iter().map(Self::entry_from).collect())
        })
    }

    fn create_group(&self, stream: &str, group: &str) -> StoreFuture<'_, ()> {
        let stream = stream.to_string();
        let group = group.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let result: Result<String, redis::RedisError> =
                conn.xgroup_create_mkstream(&stream, &group, "$").await;

            match result {
                Ok(_) => {
                    tracing::debug!(stream = %stream, group = %group, "consumer group created");
                    Ok(())
                }
                // Idempotent create: the group already existing is success.
                Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
                Err(e) => Err(StoreError::ConsumerGroup(format!(
                    "failed to create group '{group}' on '{stream}': {e}"
                ))),
            }
        })
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            // This consumer's unacked messages first: a failed handler must
            // see its message again on the next blocking read. Reading from
            // id 0 returns only the consumer's own pending entries.
            let pending_options = StreamReadOptions::default()
                .group(&group, &consumer)
                .count(count);
            let pending: Option<StreamReadReply> = conn
                .xread_options(&[stream.as_str()], &["0"], &pending_options)
                .await
                .map_err(|e| Self::transport(&e))?;

            let pending_entries: Vec<RawEntry> = pending
                .map(|reply| {
                    reply
                        .keys
                        .into_iter()
                        .flat_map(|key| key.ids)
                        .map(Self::entry_from)
                        .collect()
                })
                .unwrap_or_default();
            if !pending_entries.is_empty() {
                return Ok(pending_entries);
            }

            let options = StreamReadOptions::default()
                .group(&group, &consumer)
                .count(count)
                .block(usize::try_from(block_ms).unwrap_or(usize::MAX));

            // BLOCK timeouts come back as nil.
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[stream.as_str()], &[">"], &options)
                .await
                .map_err(|e| Self::transport(&e))?;

            let Some(reply) = reply else {
                return Ok(Vec::new());
            };

            Ok(reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .map(Self::entry_from)
                .collect())
        })
    }

    fn claim_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> StoreFuture<'_, Vec<RawEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            // XPENDING to find idle candidates, then XCLAIM to take them.
            let pending: StreamPendingCountReply = conn
                .xpending_count(&stream, &group, "-", "+", count)
                .await
                .map_err(|e| Self::transport(&e))?;

            let candidates: Vec<String> = pending
                .ids
                .into_iter()
                .filter(|entry| entry.last_delivered_ms as u64 >= min_idle_ms)
                .map(|entry| entry.id)
                .collect();
            if candidates.is_empty() {
                return Ok(Vec::new());
            }

            let min_idle = usize::try_from(min_idle_ms).unwrap_or(usize::MAX);
            let claimed: StreamClaimReply = conn
                .xclaim(&stream, &group, &consumer, min_idle, &candidates)
                .await
                .map_err(|e| Self::transport(&e))?;

            Ok(claimed.ids.into_iter().map(Self::entry_from).collect())
        })
    }

    fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> StoreFuture<'_, ()> {
        let stream = stream.to_string();
        let group = group.to_string();
        let ids = ids.to_vec();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let _: i64 = conn
                .xack(&stream, &group, &ids)
                .await
                .map_err(|e| Self::transport(&e))?;
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
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            // SET key value NX EX ttl — nil reply means the key already existed.
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_seconds)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))?;

            Ok(reply.is_some())
        })
    }

    fn incr(&self, key: &str) -> StoreFuture<'_, i64> {
        let key = key.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            conn.incr(&key, 1)
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))
        })
    }

    fn expire(&self, key: &str, ttl_seconds: u64) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let _: bool = conn
                .expire(&key, i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))?;
            Ok(())
        })
    }

    fn del(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let _: i64 = conn
                .del(&key)
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))?;
            Ok(())
        })
    }

    fn get_value(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            conn.get(&key)
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))
        })
    }

    fn put_value(&self, key: &str, value: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        let value = value.to_string();
        let mut conn = self.conn_manager.clone();
        Box::pin(async move {
            let _: () = conn
                .set(&key, &value)
                .await
                .map_err(|e| StoreError::KeyOp(e.to_string()))?;
            Ok(())
        })
    }
}
