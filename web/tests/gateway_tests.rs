//! HTTP-level gateway tests against the in-memory log store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum_test::TestServer;
use riskflow_core::domain::ShipmentPlan;
use riskflow_core::signal::RawExternalSignal;
use riskflow_core::streams::{RAW_INPUT_SIGNALS, SHIPMENT_PLANS};
use riskflow_core::EventBus;
use riskflow_testing::InMemoryLogStore;
use riskflow_web::planning_gateway::PlanningGateway;
use riskflow_web::signal_gateway::{PublishResponse, SignalGateway, SignalGatewayCounters};
use riskflow_web::GatewayConfig;
use serde_json::json;
use std::sync::Arc;

fn signal_gateway(config: GatewayConfig) -> (SignalGateway, InMemoryLogStore) {
    let store = InMemoryLogStore::new();
    let bus = EventBus::new(Arc::new(store.clone()));
    (SignalGateway::new(bus, config), store)
}

fn sample_batch() -> serde_json::Value {
    json!({
        "signals": [{
            "event_id": "e1",
            "source_type": "NEWS",
            "raw_content": "x",
            "source_reference": "r",
            "geographic_scope": "IN",
            "timestamp_utc": "2024-01-01T00:00:00Z",
            "signal_confidence": 0.8
        }]
    })
}

fn with_token(config: &mut GatewayConfig, token: &str) {
    config.auth_token = Some(token.to_string());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let mut config = GatewayConfig::with_defaults(8090);
    with_token(&mut config, "T");
    let (gateway, store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server.post("/signals").json(&sample_batch()).await;
    assert_eq!(response.status_code(), 401);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "UNAUTHORIZED");
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 0);
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let mut config = GatewayConfig::with_defaults(8090);
    with_token(&mut config, "T");
    let (gateway, _store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server
        .post("/signals")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer WRONG"))
        .json(&sample_batch())
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn correct_token_publishes_to_raw_input() {
    let mut config = GatewayConfig::with_defaults(8090);
    with_token(&mut config, "T");
    let (gateway, store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server
        .post("/signals")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer T"))
        .json(&sample_batch())
        .await;
    assert_eq!(response.status_code(), 200);

    let body: PublishResponse = response.json();
    assert_eq!(body.published.len(), 1);
    assert_eq!(body.published[0].stream, RAW_INPUT_SIGNALS);
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 1);
}

#[tokio::test]
async fn no_configured_token_means_open_gateway() {
    let (gateway, store) = signal_gateway(GatewayConfig::with_defaults(8090));
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server.post("/signals").json(&sample_batch()).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 1);
}

#[tokio::test]
async fn oversized_batch_is_unprocessable() {
    let mut config = GatewayConfig::with_defaults(8090);
    config.max_records_per_request = 2;
    let (gateway, store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    let batch = json!({
        "signals": [
            { "content": "a" }, { "content": "b" }, { "content": "c" }
        ]
    });
    let response = server.post("/signals").json(&batch).await;
    assert_eq!(response.status_code(), 422);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "BATCH_TOO_LARGE");
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected_with_413() {
    let mut config = GatewayConfig::with_defaults(8090);
    config.max_request_bytes = 256;
    let (gateway, _store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    let big = json!({ "signals": [{ "content": "y".repeat(4096) }] });
    let response = server.post("/signals").json(&big).await;
    assert_eq!(response.status_code(), 413);

    // Even extractor-level rejections carry the structured body.
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn malformed_json_is_bad_request_with_structured_body() {
    let (gateway, store) = signal_gateway(GatewayConfig::with_defaults(8090));
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server
        .post("/signals")
        .content_type("application/json")
        .text(r#"{ "signals": ["#)
        .await;
    assert_eq!(response.status_code(), 400);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 0);
}

#[tokio::test]
async fn type_mismatched_body_is_bad_request() {
    let (gateway, store) = signal_gateway(GatewayConfig::with_defaults(8090));
    let server = TestServer::new(gateway.router()).unwrap();

    // `signals` must be an array of objects.
    let response = server
        .post("/signals")
        .json(&json!({ "signals": "not-a-list" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(store.stream_len(RAW_INPUT_SIGNALS), 0);
}

#[tokio::test]
async fn metrics_reports_request_counters() {
    let mut config = GatewayConfig::with_defaults(8090);
    config.max_records_per_request = 2;
    let (gateway, _store) = signal_gateway(config);
    let server = TestServer::new(gateway.router()).unwrap();

    server.post("/signals").json(&sample_batch()).await;
    let too_big = json!({ "signals": [{}, {}, {}] });
    server.post("/signals").json(&too_big).await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    let counters: SignalGatewayCounters = response.json();
    assert_eq!(counters.requests_total, 2);
    assert_eq!(counters.requests_failed, 1);
    assert_eq!(counters.signals_received, 1);
    assert_eq!(counters.signals_published, 1);
}

#[tokio::test]
async fn health_is_ok() {
    let (gateway, _store) = signal_gateway(GatewayConfig::with_defaults(8090));
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn planning_gateway_publishes_shipments_and_inventory() {
    let store = InMemoryLogStore::new();
    let bus = EventBus::new(Arc::new(store.clone()));
    let gateway = PlanningGateway::new(bus.clone(), GatewayConfig::with_defaults(8091));
    let server = TestServer::new(gateway.router()).unwrap();

    let response = server
        .post("/shipments")
        .json(&json!({
            "shipments": [{
                "shipment_id": "s1",
                "lane_id": "mumbai-delhi-road",
                "sku": "SKU-1",
                "quantity": 10,
                "unit_revenue_inr": 100.0,
                "eta_utc": "2024-02-01T00:00:00Z"
            }]
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post("/inventory")
        .json(&json!({
            "snapshots": [{
                "sku": "SKU-1",
                "on_hand": 10.0,
                "in_transit": 0.0,
                "daily_demand": 5.0,
                "safety_stock": 5.0
            }]
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let shipments = bus
        .read_recent::<ShipmentPlan>(SHIPMENT_PLANS, 10)
        .await
        .unwrap();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0].message.shipment_id, "s1");
}

#[tokio::test]
async fn raw_signal_round_trips_through_gateway_json() {
    // The permissive schema must survive the HTTP round trip with aliases.
    let (gateway, store) = signal_gateway(GatewayConfig::with_defaults(8090));
    let server = TestServer::new(gateway.router()).unwrap();

    let batch = json!({
        "signals": [{
            "sourceType": "weather",
            "content": "storm",
            "sourceReference": "w://1",
            "region": "US-FL"
        }]
    });
    let response = server.post("/signals").json(&batch).await;
    assert_eq!(response.status_code(), 200);

    let bus = EventBus::new(Arc::new(store));
    let raws = bus
        .read_recent::<RawExternalSignal>(RAW_INPUT_SIGNALS, 1)
        .await
        .unwrap();
    assert_eq!(raws[0].message.source_type.as_deref(), Some("weather"));
    assert_eq!(raws[0].message.region.as_deref(), Some("US-FL"));
}
