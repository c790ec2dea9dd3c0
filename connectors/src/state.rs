//! Per-connector persisted state.
//!
//! A connector's state is one JSON value at `riskflow:connector:{name}:state`:
//! the last poll timestamp, an optional provider cursor, and the per-item
//! version map the change detector compares against. The whole state is
//! persisted in a single write at the end of a successful tick, so a crash
//! mid-tick re-publishes at most one tick's worth of items — which the
//! idempotency layer then absorbs.

use chrono::{DateTime, Utc};
use riskflow_core::store::{LogStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default bound on the per-item version map.
pub const DEFAULT_VERSION_MAP_CAP: usize = 10_000;

/// A bounded map of provider item id → last published version.
///
/// Eviction is insertion-order: once the cap is reached, the id tracked
/// longest is forgotten and its item will look new on the next poll. The
/// idempotency layer downstream absorbs the resulting republish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMap {
    cap: usize,
    order: VecDeque<String>,
    map: HashMap<String, String>,
}

impl VersionMap {
    /// Create an empty map bounded at `cap` entries.
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            map: HashMap::new(),
        }
    }

    /// The stored version for an item, if any.
    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<&str> {
        self.map.get(item_id).map(String::as_str)
    }

    /// Record the version last published for an item, evicting the oldest
    /// tracked id when the cap is exceeded.
    pub fn insert(&mut self, item_id: &str, version: &str) {
        if self
            .map
            .insert(item_id.to_string(), version.to_string())
            .is_none()
        {
            self.order.push_back(item_id.to_string());
            while self.order.len() > self.cap {
                if let Some(evicted) = self.order.pop_front() {
                    self.map.remove(&evicted);
                }
            }
        }
    }

    /// Number of tracked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no items are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for VersionMap {
    fn default() -> Self {
        Self::with_cap(DEFAULT_VERSION_MAP_CAP)
    }
}

/// Persisted state of one connector instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorState {
    /// When the connector last completed a poll.
    pub last_poll_utc: Option<DateTime<Utc>>,
    /// Opaque provider cursor, when the provider paginates.
    pub cursor: Option<String>,
    /// Per-item versions as of the last persisted tick.
    pub versions: VersionMap,
}

/// Store for per-connector state. Single-writer per connector name by
/// construction; only the owning connector task touches its key.
#[derive(Clone)]
pub struct ConnectorStateStore {
    store: Arc<dyn LogStore>,
}

impl ConnectorStateStore {
    /// Create a state store over the shared log store handle.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    fn state_key(connector: &str) -> String {
        format!("riskflow:connector:{connector}:state")
    }

    /// Load a connector's state, or a fresh default when absent.
    ///
    /// A state blob that no longer parses is logged and replaced with a
    /// fresh default rather than wedging the connector; the cost is one
    /// republish of the provider's current items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures.
    pub async fn load(&self, connector: &str, cap: usize) -> Result<ConnectorState, StoreError> {
        let raw = self.store.get_value(&Self::state_key(connector)).await?;
        match raw {
            None => Ok(ConnectorState {
                versions: VersionMap::with_cap(cap),
                ..ConnectorState::default()
            }),
            Some(blob) => match serde_json::from_str(&blob) {
                Ok(state) => Ok(state),
                Err(e) => {
                    tracing::warn!(
                        connector,
                        error = %e,
                        "connector state did not parse, starting fresh"
                    );
                    Ok(ConnectorState {
                        versions: VersionMap::with_cap(cap),
                        ..ConnectorState::default()
                    })
                }
            },
        }
    }

    /// Persist a connector's state in one write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures or an unserialisable
    /// state (which cannot happen for well-formed states).
    pub async fn save(&self, connector: &str, state: &ConnectorState) -> Result<(), StoreError> {
        let blob = serde_json::to_string(state)
            .map_err(|e| StoreError::KeyOp(format!("failed to serialize connector state: {e}")))?;
        self.store
            .put_value(&Self::state_key(connector), &blob)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn version_map_tracks_latest_version() {
        let mut versions = VersionMap::with_cap(10);
        versions.insert("7", "v1");
        assert_eq!(versions.get("7"), Some("v1"));
        versions.insert("7", "v2");
        assert_eq!(versions.get("7"), Some("v2"));
        assert_eq!(versions.len(), 1);
    }

    #[test]
    fn version_map_evicts_oldest_insertion() {
        let mut versions = VersionMap::with_cap(2);
        versions.insert("a", "1");
        versions.insert("b", "1");
        versions.insert("c", "1");
        assert_eq!(versions.get("a"), None);
        assert_eq!(versions.get("b"), Some("1"));
        assert_eq!(versions.get("c"), Some("1"));
    }

    #[test]
    fn version_map_round_trips_through_json() {
        let mut versions = VersionMap::with_cap(4);
        versions.insert("a", "1");
        versions.insert("b", "2");

        let blob = serde_json::to_string(&versions).unwrap();
        let restored: VersionMap = serde_json::from_str(&blob).unwrap();
        assert_eq!(restored.get("a"), Some("1"));
        assert_eq!(restored.get("b"), Some("2"));
    }
}
