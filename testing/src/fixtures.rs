//! Fixture builders shared by tests across the workspace.

use riskflow_core::signal::{ExternalSignal, RawExternalSignal, RawTimestamp, SourceType};

/// A raw signal with every canonical field populated.
#[must_use]
pub fn raw_signal(event_id: &str) -> RawExternalSignal {
    RawExternalSignal {
        event_id: Some(event_id.to_string()),
        source_type: Some("NEWS".to_string()),
        raw_content: Some("carrier embargo announced".to_string()),
        source_reference: Some("news://fixture".to_string()),
        geographic_scope: Some("IN".to_string()),
        timestamp_utc: Some(RawTimestamp::Iso("2024-01-01T00:00:00Z".to_string())),
        signal_confidence: Some(0.8),
        ..RawExternalSignal::default()
    }
}

/// A canonical signal that passes validation.
#[must_use]
pub fn external_signal(event_id: &str) -> ExternalSignal {
    ExternalSignal {
        event_id: event_id.to_string(),
        source_type: SourceType::News,
        raw_content: "carrier embargo announced".to_string(),
        source_reference: "news://fixture".to_string(),
        geographic_scope: "IN".to_string(),
        timestamp_utc: "2024-01-01T00:00:00Z".to_string(),
        ingestion_time_utc: "2024-01-01T00:00:01Z".to_string(),
        signal_confidence: 0.8,
    }
}
