//! Canonical external-signal schema and its permissive raw counterpart.
//!
//! External providers and ingress gateways submit [`RawExternalSignal`]: a
//! permissive superset that accepts snake_case and camelCase spellings for
//! every field plus generic names (`content`, `reference`, `region`,
//! `confidence`). Unknown fields are preserved in `extra` but ignored by the
//! pipeline.
//!
//! The strict [`ExternalSignal`] is produced at exactly one choke point (the
//! ingestion service's normaliser) and validated before it can reach the bus:
//! a validation failure surfaces as [`SchemaError`] and nothing is published.
//!
//! # Example
//!
//! ```
//! use riskflow_core::signal::RawExternalSignal;
//!
//! let raw: RawExternalSignal = serde_json::from_str(
//!     r#"{ "sourceType": "weather", "content": "storm", "region": "US-FL" }"#,
//! ).unwrap();
//! assert_eq!(raw.source_type.as_deref(), Some("weather"));
//! assert_eq!(raw.content.as_deref(), Some("storm"));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from schema validation of a normalised signal.
///
/// A `SchemaError` means the raw input could not be canonicalised; the
/// attempt is dropped with a log entry and never reaches the bus.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A required field was empty after normalisation.
    #[error("field '{0}' must be non-empty")]
    EmptyField(&'static str),

    /// The source type is outside the known enumeration.
    #[error("unknown source type: {0}")]
    UnknownSourceType(String),

    /// The timestamp is not ISO-8601 (`T` separator required).
    #[error("timestamp is not ISO-8601: {0}")]
    InvalidTimestamp(String),

    /// Signal confidence fell outside `[0, 1]`.
    #[error("signal confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// The category of provider a signal originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Weather alerts and forecasts.
    Weather,
    /// Logistics and trade news feeds.
    News,
    /// Social feeds.
    Social,
    /// Road, rail and port traffic feeds.
    Traffic,
}

impl SourceType {
    /// Parse an already-uppercased source type string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownSourceType`] for anything outside the
    /// enumeration.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s {
            "WEATHER" => Ok(Self::Weather),
            "NEWS" => Ok(Self::News),
            "SOCIAL" => Ok(Self::Social),
            "TRAFFIC" => Ok(Self::Traffic),
            other => Err(SchemaError::UnknownSourceType(other.to_string())),
        }
    }

    /// Stable wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Weather => "WEATHER",
            Self::News => "NEWS",
            Self::Social => "SOCIAL",
            Self::Traffic => "TRAFFIC",
        }
    }
}

/// A raw timestamp as submitted by a provider: ISO-8601 text or epoch millis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// ISO-8601 text, e.g. `2024-01-01T00:00:00Z`.
    Iso(String),
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
}

/// A raw external signal as submitted by a provider, connector or gateway.
///
/// Every field is optional; snake_case names carry camelCase aliases, and the
/// generic spellings (`content`, `reference`, `region`, `confidence`) are
/// modelled as their own slots so the normaliser can apply the documented
/// precedence. Unknown fields are kept in `extra` and otherwise ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExternalSignal {
    /// Stable event identifier, when the provider supplies one.
    #[serde(default, alias = "eventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Provider category; normalised to uppercase downstream.
    #[serde(default, alias = "sourceType", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Signal body (preferred spelling).
    #[serde(default, alias = "rawContent", skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,

    /// Signal body (generic alias, lower precedence than `raw_content`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Provider-specific reference (preferred spelling).
    #[serde(default, alias = "sourceReference", skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<String>,

    /// Provider-specific reference (generic alias).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Geographic scope (preferred spelling).
    #[serde(default, alias = "geographicScope", skip_serializing_if = "Option::is_none")]
    pub geographic_scope: Option<String>,

    /// Geographic scope (generic alias).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Signal timestamp: ISO-8601 text or epoch millis.
    #[serde(default, alias = "timestampUtc", skip_serializing_if = "Option::is_none")]
    pub timestamp_utc: Option<RawTimestamp>,

    /// Provider confidence (preferred spelling).
    #[serde(default, alias = "signalConfidence", skip_serializing_if = "Option::is_none")]
    pub signal_confidence: Option<f64>,

    /// Provider confidence (generic alias).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Unknown fields, preserved but ignored by the pipeline.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A validated canonical signal.
///
/// Every instance on the `external-signals` stream satisfies [`Self::validate`];
/// the ingestion service guarantees this before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSignal {
    /// Stable identifier, unchanged across retries of the same raw input.
    pub event_id: String,
    /// Provider category.
    pub source_type: SourceType,
    /// Signal body.
    pub raw_content: String,
    /// Provider-specific reference.
    pub source_reference: String,
    /// Geographic scope the signal applies to.
    pub geographic_scope: String,
    /// Signal timestamp, ISO-8601 with `T` separator.
    pub timestamp_utc: String,
    /// When the signal was normalised, ISO-8601.
    pub ingestion_time_utc: String,
    /// Confidence in `[0, 1]`.
    pub signal_confidence: f64,
}

impl ExternalSignal {
    /// Validate the canonical schema invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`SchemaError`]. Validation runs after
    /// normalisation; a failure here means nothing is published.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.event_id.trim().is_empty() {
            return Err(SchemaError::EmptyField("event_id"));
        }
        if self.raw_content.trim().is_empty() {
            return Err(SchemaError::EmptyField("raw_content"));
        }
        if self.source_reference.trim().is_empty() {
            return Err(SchemaError::EmptyField("source_reference"));
        }
        if self.geographic_scope.trim().is_empty() {
            return Err(SchemaError::EmptyField("geographic_scope"));
        }
        if !self.timestamp_utc.contains('T') {
            return Err(SchemaError::InvalidTimestamp(self.timestamp_utc.clone()));
        }
        if !(0.0..=1.0).contains(&self.signal_confidence) {
            return Err(SchemaError::ConfidenceOutOfRange(self.signal_confidence));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn valid_signal() -> ExternalSignal {
        ExternalSignal {
            event_id: "e1".to_string(),
            source_type: SourceType::News,
            raw_content: "port strike announced".to_string(),
            source_reference: "news://42".to_string(),
            geographic_scope: "IN-MH".to_string(),
            timestamp_utc: "2024-01-01T00:00:00Z".to_string(),
            ingestion_time_utc: "2024-01-01T00:00:01Z".to_string(),
            signal_confidence: 0.8,
        }
    }

    #[test]
    fn valid_signal_passes() {
        assert_eq!(valid_signal().validate(), Ok(()));
    }

    #[test]
    fn empty_fields_rejected() {
        let mut s = valid_signal();
        s.event_id = "  ".to_string();
        assert_eq!(s.validate(), Err(SchemaError::EmptyField("event_id")));

        let mut s = valid_signal();
        s.raw_content = String::new();
        assert_eq!(s.validate(), Err(SchemaError::EmptyField("raw_content")));
    }

    #[test]
    fn timestamp_without_t_rejected() {
        let mut s = valid_signal();
        s.timestamp_utc = "2024-01-01 00:00:00".to_string();
        assert!(matches!(s.validate(), Err(SchemaError::InvalidTimestamp(_))));
    }

    #[test]
    fn confidence_out_of_range_rejected() {
        let mut s = valid_signal();
        s.signal_confidence = 1.5;
        assert!(matches!(
            s.validate(),
            Err(SchemaError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn source_type_parse_rejects_unknown() {
        assert!(SourceType::parse("WEATHER").is_ok());
        assert_eq!(
            SourceType::parse("UNKNOWN"),
            Err(SchemaError::UnknownSourceType("UNKNOWN".to_string()))
        );
    }

    #[test]
    fn raw_signal_accepts_camel_case_aliases() {
        let raw: RawExternalSignal = serde_json::from_str(
            r#"{
                "eventId": "e7",
                "sourceType": "weather",
                "rawContent": "storm",
                "sourceReference": "w://1",
                "geographicScope": "US-FL",
                "timestampUtc": 1704067200000,
                "signalConfidence": 0.9
            }"#,
        )
        .unwrap();
        assert_eq!(raw.event_id.as_deref(), Some("e7"));
        assert_eq!(raw.source_type.as_deref(), Some("weather"));
        assert_eq!(raw.raw_content.as_deref(), Some("storm"));
        assert_eq!(
            raw.timestamp_utc,
            Some(RawTimestamp::EpochMillis(1_704_067_200_000))
        );
    }

    #[test]
    fn raw_signal_preserves_unknown_fields() {
        let raw: RawExternalSignal =
            serde_json::from_str(r#"{ "content": "x", "provider_shard": 3 }"#).unwrap();
        assert_eq!(raw.extra.get("provider_shard"), Some(&serde_json::json!(3)));
    }
}
