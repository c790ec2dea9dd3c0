//! The signal ingress gateway.
//!
//! `POST /signals` accepts `{ "signals": [ …raw signals ] }`, authenticates
//! against the optional static bearer token, enforces the request and batch
//! caps, and appends each record to `raw-input-signals`. The response lists
//! the publish receipts so clients can correlate retries.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::extractors::GatewayJson;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use riskflow_core::bus::PublishedRecord;
use riskflow_core::signal::RawExternalSignal;
use riskflow_core::streams::RAW_INPUT_SIGNALS;
use riskflow_core::EventBus;
use riskflow_runtime::shutdown::ShutdownSignal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request body for `POST /signals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBatch {
    /// The raw signals to publish.
    pub signals: Vec<RawExternalSignal>,
}

/// Response body for `POST /signals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    /// One receipt per published signal, in request order.
    pub published: Vec<PublishedRecord>,
}

/// Signal gateway counters, served at `GET /metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalGatewayCounters {
    /// Requests handled, including rejected ones.
    pub requests_total: u64,
    /// Requests that did not end in 200.
    pub requests_failed: u64,
    /// Signals received inside accepted batches.
    pub signals_received: u64,
    /// Signals appended to the bus.
    pub signals_published: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    signals_received: AtomicU64,
    signals_published: AtomicU64,
}

/// Shared state of the signal gateway.
#[derive(Clone)]
pub struct SignalGateway {
    bus: EventBus,
    config: Arc<GatewayConfig>,
    counters: Arc<Counters>,
}

impl SignalGateway {
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
    pub fn counters(&self) -> SignalGatewayCounters {
        SignalGatewayCounters {
            requests_total: self.counters.requests_total.load(Ordering::Relaxed),
            requests_failed: self.counters.requests_failed.load(Ordering::Relaxed),
            signals_received: self.counters.signals_received.load(Ordering::Relaxed),
            signals_published: self.counters.signals_published.load(Ordering::Relaxed),
        }
    }

    /// The gateway router. The body limit yields 413 before any handler
    /// runs.
    #[must_use]
    pub fn router(self) -> Router {
        let body_limit = self.config.max_request_bytes;
        Router::new()
            .route("/signals", post(post_signals))
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
        tracing::info!(addr = %addr, "signal gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
    }
}

/// Check the static bearer token, when one is configured.
pub(crate) fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), GatewayError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided == Some(expected) {
        Ok(())
    } else {
        Err(GatewayError::unauthorized())
    }
}

async fn post_signals(
    State(gateway): State<SignalGateway>,
    headers: HeaderMap,
    GatewayJson(batch): GatewayJson<SignalBatch>,
) -> Result<Json<PublishResponse>, GatewayError> {
    gateway.counters.requests_total.fetch_add(1, Ordering::Relaxed);

    let result = async {
        check_bearer(&headers, gateway.config.auth_token.as_deref())?;

        if batch.signals.len() > gateway.config.max_records_per_request {
            return Err(GatewayError::batch_too_large(
                batch.signals.len(),
                gateway.config.max_records_per_request,
            ));
        }

        gateway
            .counters
            .signals_received
            .fetch_add(batch.signals.len() as u64, Ordering::Relaxed);

        let mut published = Vec::with_capacity(batch.signals.len());
        for signal in &batch.signals {
            let receipt = gateway
                .bus
                .publish(RAW_INPUT_SIGNALS, signal)
                .await
                .map_err(|e| GatewayError::publish_failed(e.to_string()))?;
            gateway
                .counters
                .signals_published
                .fetch_add(1, Ordering::Relaxed);
            published.push(receipt);
        }

        Ok(PublishResponse { published })
    }
    .await;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            gateway.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
            Err(e)
        }
    }
}

async fn get_metrics(State(gateway): State<SignalGateway>) -> Json<SignalGatewayCounters> {
    Json(gateway.counters())
}

async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
