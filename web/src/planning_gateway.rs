//! The planning ingress gateway.
//!
//! Accepts planned shipments (`POST /shipments`) and inventory snapshots
//! (`POST /inventory`) and appends them to their streams; the planning-state
//! workers downstream fold them into the lookup the impact service uses.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::extractors::GatewayJson;
use crate::signal_gateway::check_bearer;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use riskflow_core::bus::PublishedRecord;
use riskflow_core::domain::{InventorySnapshot, ShipmentPlan};
use riskflow_core::streams::{INVENTORY_SNAPSHOTS, SHIPMENT_PLANS};
use riskflow_core::EventBus;
use riskflow_runtime::shutdown::ShutdownSignal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request body for `POST /shipments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentBatch {
    /// The shipment plans to publish.
    pub shipments: Vec<ShipmentPlan>,
}

/// Request body for `POST /inventory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryBatch {
    /// The inventory snapshots to publish.
    pub snapshots: Vec<InventorySnapshot>,
}

/// Response body for both publish endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    /// One receipt per published record, in request order.
    pub published: Vec<PublishedRecord>,
}

/// Planning gateway counters, served at `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningGatewayCounters {
    /// Requests handled, including rejected ones.
    pub requests_total: u64,
    /// Requests that did not end in 200.
    pub requests_failed: u64,
    /// Records received inside accepted batches.
    pub records_received: u64,
    /// Records appended to the bus.
    pub records_published: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    records_received: AtomicU64,
    records_published: AtomicU64,
}

/// Shared state of the planning gateway.
#[derive(Clone)]
pub struct PlanningGateway {
    bus: EventBus,
    config: Arc<GatewayConfig>,
    counters: Arc<Counters>,
}

impl PlanningGateway {
    /// Build the gateway state.
    #[must_use]
    pub fn new(bus: EventBus, config: GatewayConfig) -> Self {
        Self {
            bus,
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current counter values.
    #[must_use]
    pub fn counters(&self) -> PlanningGatewayCounters {
        PlanningGatewayCounters {
            requests_total: self.counters.requests_total.load(Ordering::Relaxed),
            requests_failed: self.counters.requests_failed.load(Ordering::Relaxed),
            records_received: self.counters.records_received.load(Ordering::Relaxed),
            records_published: self.counters.records_published.load(Ordering::Relaxed),
        }
    }

    /// The gateway router.
    #[must_use]
    pub fn router(self) -> Router {
        let body_limit = self.config.max_request_bytes;
        Router::new()
            .route("/shipments", post(post_shipments))
            .route("/inventory", post(post_inventory))
            .route("/metrics", get(get_metrics))
            .route("/health", get(get_health))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Bind and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the bind or serve error; the caller exits with code 1.
    pub async fn serve(self, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "planning gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
    }

    /// Shared guard + publish loop for both endpoints.
    async fn publish_batch<T: Serialize>(
        &self,
        headers: &HeaderMap,
        stream: &str,
        records: &[T],
    ) -> Result<PublishResponse, GatewayError> {
        self.counters.requests_total.fetch_add(1, Ordering::Relaxed);

        let result = async {
            check_bearer(headers, self.config.auth_token.as_deref())?;

            if records.len() > self.config.max_records_per_request {
                return Err(GatewayError::batch_too_large(
                    records.len(),
                    self.config.max_records_per_request,
                ));
            }

            self.counters
                .records_received
                .fetch_add(records.len() as u64, Ordering::Relaxed);

            let mut published = Vec::with_capacity(records.len());
            for record in records {
                let receipt = self
                    .bus
                    .publish(stream, record)
                    .await
                    .map_err(|e| GatewayError::publish_failed(e.to_string()))?;
                self.counters
                    .records_published
                    .fetch_add(1, Ordering::Relaxed);
                published.push(receipt);
            }

            Ok(PublishResponse { published })
        }
        .await;

        if result.is_err() {
            self.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

async fn post_shipments(
    State(gateway): State<PlanningGateway>,
    headers: HeaderMap,
    GatewayJson(batch): GatewayJson<ShipmentBatch>,
) -> Result<Json<PublishResponse>, GatewayError> {
    gateway
        .publish_batch(&headers, SHIPMENT_PLANS, &batch.shipments)
        .await
        .map(Json)
}

async fn post_inventory(
    State(gateway): State<PlanningGateway>,
    headers: HeaderMap,
    GatewayJson(batch): GatewayJson<InventoryBatch>,
) -> Result<Json<PublishResponse>, GatewayError> {
    gateway
        .publish_batch(&headers, INVENTORY_SNAPSHOTS, &batch.snapshots)
        .await
        .map(Json)
}

async fn get_metrics(State(gateway): State<PlanningGateway>) -> Json<PlanningGatewayCounters> {
    Json(gateway.counters())
}

async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
