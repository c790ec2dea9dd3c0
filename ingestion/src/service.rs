//! Deduplicated signal ingestion.
//!
//! [`SignalIngestor`] is the shared ingest path: normalise, mark-first-seen,
//! publish, roll the marker back if the publish fails. The polling
//! [`SignalIngestionService`] drives it over a set of registered
//! [`SignalSource`]s; the raw-input stream worker drives the same ingestor
//! from the bus.

use crate::normalize::normalize_raw_signal;
use chrono::Utc;
use riskflow_core::bus::{BusError, PublishedRecord};
use riskflow_core::signal::{RawExternalSignal, SchemaError};
use riskflow_core::store::StoreError;
use riskflow_core::streams::EXTERNAL_SIGNALS;
use riskflow_core::{EventBus, IdempotencyStore};
use riskflow_runtime::shutdown::ShutdownSignal;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

/// Future type returned by [`SignalSource::poll`].
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// A signal source failed to poll. Counted and logged, never fatal.
#[derive(Error, Debug, Clone)]
#[error("signal source failed: {0}")]
pub struct SourceError(pub String);

/// A pollable source of raw signals registered with the ingestion service.
pub trait SignalSource: Send + Sync {
    /// Stable source name for logs and metrics.
    fn name(&self) -> &str;

    /// Return the currently available raw signals.
    fn poll(&self) -> SourceFuture<'_, Vec<RawExternalSignal>>;
}

/// Errors from a single ingest attempt.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The raw signal failed normalisation; dropped with a log entry.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The idempotency store failed; the signal is not published.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The publish failed; the idempotency marker has been rolled back.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Outcome of a successful ingest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First-seen: the canonical signal was published.
    Published(PublishedRecord),
    /// A marker for `(stream, event_id)` already existed; dropped without
    /// side effects.
    Deduplicated {
        /// The duplicate event id.
        event_id: String,
    },
}

/// Counters for one ingestion cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Raw signals returned by all sources.
    pub polled: usize,
    /// Signals that passed normalisation.
    pub normalized: usize,
    /// Signals dropped as duplicates.
    pub deduplicated: usize,
    /// Signals published to `external-signals`.
    pub published: usize,
    /// Signals that failed normalisation or publish.
    pub failed: usize,
}

/// The shared normalise → dedupe → publish path.
#[derive(Clone)]
pub struct SignalIngestor {
    bus: EventBus,
    markers: IdempotencyStore,
    output_stream: String,
}

impl SignalIngestor {
    /// Build an ingestor publishing to `external-signals`.
    #[must_use]
    pub fn new(bus: EventBus, markers: IdempotencyStore) -> Self {
        Self {
            bus,
            markers,
            output_stream: EXTERNAL_SIGNALS.to_string(),
        }
    }

    /// Override the output stream.
    #[must_use]
    pub fn with_output_stream(mut self, stream: impl Into<String>) -> Self {
        self.output_stream = stream.into();
        self
    }

    /// Normalise one raw signal and publish it if first-seen.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Schema`] when normalisation fails — nothing reaches
    ///   the bus.
    /// - [`IngestError::Bus`] when the publish fails — the idempotency
    ///   marker is rolled back first so a retry of the same raw input can
    ///   proceed.
    pub async fn ingest_one(&self, raw: &RawExternalSignal) -> Result<IngestOutcome, IngestError> {
        let signal = normalize_raw_signal(raw, Utc::now())?;

        let first_seen = self
            .markers
            .mark_if_first_seen(&self.output_stream, &signal.event_id)
            .await?;

        if !first_seen {
            tracing::debug!(event_id = %signal.event_id, "duplicate signal dropped");
            return Ok(IngestOutcome::Deduplicated {
                event_id: signal.event_id,
            });
        }

        match self.bus.publish(&self.output_stream, &signal).await {
            Ok(receipt) => Ok(IngestOutcome::Published(receipt)),
            Err(e) => {
                // Roll the marker back so a later retry is not suppressed.
                if let Err(clear_err) = self
                    .markers
                    .clear(&self.output_stream, &signal.event_id)
                    .await
                {
                    tracing::error!(
                        event_id = %signal.event_id,
                        error = %clear_err,
                        "failed to roll back idempotency marker"
                    );
                }
                Err(e.into())
            }
        }
    }
}

/// Polls registered sources and feeds the ingestor.
pub struct SignalIngestionService {
    sources: Vec<Arc<dyn SignalSource>>,
    ingestor: SignalIngestor,
    poll_interval: Duration,
}

impl SignalIngestionService {
    /// Build the service over a set of sources.
    #[must_use]
    pub fn new(
        sources: Vec<Arc<dyn SignalSource>>,
        ingestor: SignalIngestor,
        poll_interval: Duration,
    ) -> Self {
        Self {
            sources,
            ingestor,
            poll_interval,
        }
    }

    /// Poll every source once and ingest what came back.
    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for source in &self.sources {
            let raws = match source.poll().await {
                Ok(raws) => raws,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "source poll failed");
                    continue;
                }
            };

            summary.polled += raws.len();

            for raw in &raws {
                match self.ingestor.ingest_one(raw).await {
                    Ok(IngestOutcome::Published(_)) => {
                        summary.normalized += 1;
                        summary.published += 1;
                    }
                    Ok(IngestOutcome::Deduplicated { event_id }) => {
                        summary.normalized += 1;
                        summary.deduplicated += 1;
                        tracing::debug!(
                            source = source.name(),
                            event_id = %event_id,
                            "signal deduplicated"
                        );
                    }
                    Err(IngestError::Schema(e)) => {
                        summary.failed += 1;
                        tracing::warn!(
                            source = source.name(),
                            error = %e,
                            "raw signal rejected by schema"
                        );
                    }
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(source = source.name(), error = %e, "signal ingest failed");
                    }
                }
            }
        }

        summary
    }

    /// Drive ingestion cycles until shutdown.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sources = self.sources.len(),
            poll_interval_ms = self.poll_interval.as_millis(),
            "signal ingestion service started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.run_cycle().await;
                    tracing::info!(
                        polled = summary.polled,
                        normalized = summary.normalized,
                        deduplicated = summary.deduplicated,
                        published = summary.published,
                        failed = summary.failed,
                        "ingestion cycle complete"
                    );
                }
                _ = shutdown.wait() => break,
            }
        }

        tracing::info!("signal ingestion service stopped");
    }
}
