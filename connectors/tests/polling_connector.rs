//! Polling connector behaviour against a scripted provider.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use riskflow_connectors::{
    ConnectorConfig, ConnectorError, ConnectorStateStore, PollingConnector, PollingProvider,
    ProviderError, TickSummary,
};
use riskflow_connectors::provider::ProviderFuture;
use riskflow_core::signal::RawExternalSignal;
use riskflow_core::streams::RAW_INPUT_SIGNALS;
use riskflow_core::EventBus;
use riskflow_testing::InMemoryLogStore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider that replays scripted batches and versions.
struct ScriptedProvider {
    batches: Mutex<Vec<Vec<Value>>>,
    fetch_failures: AtomicUsize,
}

impl ScriptedProvider {
    fn new(batches: Vec<Vec<Value>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            fetch_failures: AtomicUsize::new(0),
        }
    }

    fn failing(times: usize) -> Self {
        let provider = Self::new(vec![]);
        provider.fetch_failures.store(times, Ordering::SeqCst);
        provider
    }
}

impl PollingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self) -> ProviderFuture<'_, Vec<Value>> {
        Box::pin(async move {
            if self.fetch_failures.load(Ordering::SeqCst) > 0 {
                self.fetch_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Request("scripted outage".into()));
            }
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(vec![])
            } else {
                Ok(batches.remove(0))
            }
        })
    }

    fn item_id(&self, item: &Value) -> String {
        item["id"].to_string()
    }

    fn version(&self, item: &Value) -> String {
        item["version"].as_str().unwrap_or_default().to_string()
    }

    fn transform(&self, item: &Value) -> Result<RawExternalSignal, ProviderError> {
        if item["poison"].as_bool() == Some(true) {
            return Err(ProviderError::Transform("scripted poison item".into()));
        }
        Ok(RawExternalSignal {
            event_id: Some(format!("scripted-{}", self.item_id(item))),
            source_type: Some("TRAFFIC".to_string()),
            raw_content: Some(item["body"].as_str().unwrap_or("n/a").to_string()),
            source_reference: Some("scripted://feed".to_string()),
            geographic_scope: Some("IN".to_string()),
            ..RawExternalSignal::default()
        })
    }
}

fn connector_with(
    provider: ScriptedProvider,
    store: &InMemoryLogStore,
) -> PollingConnector {
    let config = ConnectorConfig::new(
        "scripted",
        Duration::from_millis(50),
        Duration::from_millis(200),
    )
    .with_max_retries(1);

    PollingConnector::new(
        config,
        Arc::new(provider),
        EventBus::new(Arc::new(store.clone())),
        ConnectorStateStore::new(Arc::new(store.clone())),
    )
    .unwrap()
}

fn item(id: u64, version: &str) -> Value {
    json!({ "id": id, "version": version, "body": "traffic jam" })
}

#[tokio::test]
async fn unchanged_version_is_skipped_on_second_tick() {
    let store = InMemoryLogStore::new();
    let provider = ScriptedProvider::new(vec![vec![item(7, "v1")], vec![item(7, "v1")]]);
    let mut connector = connector_with(provider, &store);

    let first = connector.tick().await.unwrap();
    assert_eq!(
        first,
        TickSummary {
            fetched: 1,
            published: 1,
            skipped_unchanged: 0,
            failed: 0
        }
    );

    let second = connector.tick().await.unwrap();
    assert_eq!(
        second,
        TickSummary {
            fetched: 1,
            published: 0,
            skipped_unchanged: 1,
            failed: 0
        }
    );
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 1);
}

#[tokio::test]
async fn changed_version_republishes() {
    let store = InMemoryLogStore::new();
    let provider = ScriptedProvider::new(vec![vec![item(7, "v1")], vec![item(7, "v2")]]);
    let mut connector = connector_with(provider, &store);

    connector.tick().await.unwrap();
    let second = connector.tick().await.unwrap();
    assert_eq!(second.published, 1);
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 2);
}

#[tokio::test]
async fn item_failure_does_not_abort_the_poll() {
    let store = InMemoryLogStore::new();
    let batch = vec![
        item(1, "v1"),
        json!({ "id": 2, "version": "v1", "poison": true }),
        item(3, "v1"),
    ];
    let provider = ScriptedProvider::new(vec![batch]);
    let mut connector = connector_with(provider, &store);

    let summary = connector.tick().await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        summary.published + summary.skipped_unchanged + summary.failed,
        summary.fetched
    );
}

#[tokio::test]
async fn versions_survive_connector_restarts() {
    let store = InMemoryLogStore::new();

    let mut first = connector_with(
        ScriptedProvider::new(vec![vec![item(7, "v1")]]),
        &store,
    );
    first.tick().await.unwrap();

    // A brand-new instance with the same name loads the persisted state.
    let mut second = connector_with(
        ScriptedProvider::new(vec![vec![item(7, "v1")]]),
        &store,
    );
    let summary = second.tick().await.unwrap();
    assert_eq!(summary.skipped_unchanged, 1);
    assert_eq!(summary.published, 0);
}

#[tokio::test]
async fn fetch_retries_then_succeeds_within_tick() {
    let store = InMemoryLogStore::new();
    let provider = ScriptedProvider::new(vec![vec![item(1, "v1")]]);
    provider.fetch_failures.store(1, Ordering::SeqCst);
    let mut connector = connector_with(provider, &store);

    let summary = connector.tick().await.unwrap();
    assert_eq!(summary.published, 1);
}

#[tokio::test]
async fn fetch_exhaustion_surrenders_the_tick() {
    let store = InMemoryLogStore::new();
    let mut connector = connector_with(ScriptedProvider::failing(5), &store);

    let err = connector.tick().await.unwrap_err();
    assert!(matches!(err, ConnectorError::FetchExhausted { .. }));
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 0);
}

#[test]
fn zero_poll_interval_is_rejected() {
    let store = InMemoryLogStore::new();
    let config = ConnectorConfig::new("bad", Duration::ZERO, Duration::from_secs(1));
    let result = PollingConnector::new(
        config,
        Arc::new(ScriptedProvider::new(vec![])),
        EventBus::new(Arc::new(store.clone())),
        ConnectorStateStore::new(Arc::new(store)),
    );
    assert!(matches!(result, Err(ConnectorError::Config(_))));
}
