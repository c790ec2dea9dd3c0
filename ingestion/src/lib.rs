//! # Riskflow Ingestion
//!
//! Normalisation of untrusted raw signals into the validated canonical
//! schema, followed by deduplicated publish onto `external-signals`.
//!
//! Canonicalisation happens at exactly one choke point,
//! [`normalize::normalize_raw_signal`]; everything that turns a
//! [`RawExternalSignal`](riskflow_core::signal::RawExternalSignal) into a
//! published canonical signal — the polling ingestion service here and the
//! raw-input stream worker in `riskflow-pipeline` — goes through the shared
//! [`service::SignalIngestor`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod normalize;
pub mod service;

pub use normalize::normalize_raw_signal;
pub use service::{
    CycleSummary, IngestError, IngestOutcome, SignalIngestionService, SignalIngestor,
    SignalSource, SourceError,
};
