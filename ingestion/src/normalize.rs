//! The single choke point where raw signals become canonical.
//!
//! Normalisation rules, applied in order, then validated as a whole:
//!
//! - `event_id`: provided id (either spelling), else a freshly minted UUID.
//! - `source_type`: uppercased; `NEWS` when missing. A *provided but
//!   unknown* type survives to validation and is rejected there.
//! - `raw_content`: first non-empty of `raw_content`, `content`, else the
//!   JSON of the whole raw record.
//! - `source_reference` / `geographic_scope`: preferred spelling, then the
//!   generic alias; no further fallback — emptiness fails validation.
//! - `timestamp_utc`: ISO-8601 containing `T`, or epoch millis; else now.
//! - `signal_confidence`: provided value clamped to `[0, 1]`, default `0.5`.

use chrono::{DateTime, Utc};
use riskflow_core::signal::{
    ExternalSignal, RawExternalSignal, RawTimestamp, SchemaError, SourceType,
};
use uuid::Uuid;

fn first_non_empty<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn normalize_timestamp(raw: Option<&RawTimestamp>, now: DateTime<Utc>) -> String {
    match raw {
        Some(RawTimestamp::Iso(s)) if s.contains('T') => s.clone(),
        Some(RawTimestamp::EpochMillis(ms)) => DateTime::from_timestamp_millis(*ms)
            .map_or_else(|| now.to_rfc3339(), |dt| dt.to_rfc3339()),
        _ => now.to_rfc3339(),
    }
}

/// Normalise a raw signal into the validated canonical schema.
///
/// # Errors
///
/// Returns [`SchemaError`] when the normalised candidate fails validation —
/// unknown source type, empty required field, malformed timestamp. Nothing
/// is published for a rejected signal.
pub fn normalize_raw_signal(
    raw: &RawExternalSignal,
    now: DateTime<Utc>,
) -> Result<ExternalSignal, SchemaError> {
    let event_id = first_non_empty(&[&raw.event_id])
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);

    let source_type_text = raw
        .source_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| "NEWS".to_string(), str::to_uppercase);
    let source_type = SourceType::parse(&source_type_text)?;

    let raw_content = first_non_empty(&[&raw.raw_content, &raw.content]).map_or_else(
        || serde_json::to_string(raw).unwrap_or_default(),
        ToString::to_string,
    );

    let source_reference = first_non_empty(&[&raw.source_reference, &raw.reference])
        .unwrap_or_default()
        .to_string();

    let geographic_scope = first_non_empty(&[&raw.geographic_scope, &raw.region])
        .unwrap_or_default()
        .to_string();

    let signal_confidence = raw
        .signal_confidence
        .or(raw.confidence)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let signal = ExternalSignal {
        event_id,
        source_type,
        raw_content,
        source_reference,
        geographic_scope,
        timestamp_utc: normalize_timestamp(raw.timestamp_utc.as_ref(), now),
        ingestion_time_utc: now.to_rfc3339(),
        signal_confidence,
    };

    signal.validate()?;
    Ok(signal)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn generic_aliases_are_canonicalised() {
        let raw: RawExternalSignal = serde_json::from_str(
            r#"{ "sourceType": "weather", "content": "storm",
                 "sourceReference": "w://1", "region": "US-FL" }"#,
        )
        .unwrap();

        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert_eq!(signal.source_type, SourceType::Weather);
        assert_eq!(signal.raw_content, "storm");
        assert_eq!(signal.source_reference, "w://1");
        assert_eq!(signal.geographic_scope, "US-FL");
        assert!((signal.signal_confidence - 0.5).abs() < f64::EPSILON);
        // Minted id must be a well-formed UUID.
        assert!(Uuid::parse_str(&signal.event_id).is_ok());
    }

    #[test]
    fn minted_ids_are_unique() {
        let raw: RawExternalSignal =
            serde_json::from_str(r#"{ "content": "x", "reference": "r", "region": "IN" }"#)
                .unwrap();
        let a = normalize_raw_signal(&raw, now()).unwrap();
        let b = normalize_raw_signal(&raw, now()).unwrap();
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn provided_event_id_is_kept() {
        let raw: RawExternalSignal = serde_json::from_str(
            r#"{ "event_id": "e1", "content": "x", "reference": "r", "region": "IN" }"#,
        )
        .unwrap();
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert_eq!(signal.event_id, "e1");
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let raw: RawExternalSignal = serde_json::from_str(
            r#"{ "source_type": "unknown", "content": "x", "reference": "r", "region": "IN" }"#,
        )
        .unwrap();
        assert_eq!(
            normalize_raw_signal(&raw, now()),
            Err(SchemaError::UnknownSourceType("UNKNOWN".to_string()))
        );
    }

    #[test]
    fn missing_source_type_defaults_to_news() {
        let raw: RawExternalSignal =
            serde_json::from_str(r#"{ "content": "x", "reference": "r", "region": "IN" }"#)
                .unwrap();
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert_eq!(signal.source_type, SourceType::News);
    }

    #[test]
    fn content_falls_back_to_whole_record_json() {
        let raw: RawExternalSignal =
            serde_json::from_str(r#"{ "reference": "r", "region": "IN", "odd_field": 1 }"#)
                .unwrap();
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert!(signal.raw_content.contains("odd_field"));
    }

    #[test]
    fn epoch_millis_timestamp_is_converted() {
        let raw: RawExternalSignal = serde_json::from_str(
            r#"{ "content": "x", "reference": "r", "region": "IN",
                 "timestamp_utc": 1704067200000 }"#,
        )
        .unwrap();
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert!(signal.timestamp_utc.starts_with("2024-01-01T00:00:00"));
    }

    #[test]
    fn non_iso_timestamp_falls_back_to_now() {
        let raw = RawExternalSignal {
            content: Some("x".into()),
            reference: Some("r".into()),
            region: Some("IN".into()),
            timestamp_utc: Some(RawTimestamp::Iso("January 1st".into())),
            ..RawExternalSignal::default()
        };
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert_eq!(signal.timestamp_utc, now().to_rfc3339());
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = RawExternalSignal {
            content: Some("x".into()),
            reference: Some("r".into()),
            region: Some("IN".into()),
            confidence: Some(3.2),
            ..RawExternalSignal::default()
        };
        let signal = normalize_raw_signal(&raw, now()).unwrap();
        assert!((signal.signal_confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_region_is_rejected() {
        let raw = RawExternalSignal {
            content: Some("x".into()),
            reference: Some("r".into()),
            ..RawExternalSignal::default()
        };
        assert_eq!(
            normalize_raw_signal(&raw, now()),
            Err(SchemaError::EmptyField("geographic_scope"))
        );
    }
}
