//! The raw-input normaliser worker handler.
//!
//! Connects the gateways and connectors to the pipeline: consumes
//! `raw-input-signals` and drives the shared
//! [`SignalIngestor`](riskflow_ingestion::SignalIngestor) — the same
//! normalise → dedupe → publish path the polling ingestion service uses.

use crate::worker::{HandlerError, HandlerFuture, MessageHandler};
use riskflow_core::bus::EventRecord;
use riskflow_core::signal::RawExternalSignal;
use riskflow_ingestion::{IngestError, SignalIngestor};

/// Handler for the `raw-input-signals` consumer group.
pub struct RawSignalHandler {
    ingestor: SignalIngestor,
}

impl RawSignalHandler {
    /// Build the handler over the shared ingestor.
    #[must_use]
    pub const fn new(ingestor: SignalIngestor) -> Self {
        Self { ingestor }
    }
}

impl MessageHandler for RawSignalHandler {
    type Message = RawExternalSignal;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            match self.ingestor.ingest_one(&record.message).await {
                Ok(_) => Ok(()),
                // Schema rejections are permanent: re-delivery cannot fix the
                // record, so drop it with a log instead of burning retries.
                Err(IngestError::Schema(e)) => {
                    tracing::warn!(
                        id = %record.id,
                        error = %e,
                        "raw signal rejected by schema, dropped"
                    );
                    Ok(())
                }
                Err(e) => Err(HandlerError::from_display(e)),
            }
        })
    }
}
