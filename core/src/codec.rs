//! The event codec: the only point where the log's field shape is known.
//!
//! Every entry on the log carries exactly two string fields:
//!
//! - `payload` — the JSON serialisation of the message
//! - `published_at_utc` — the publisher's UTC timestamp, ISO-8601
//!
//! Decoding fails with [`CodecError`] when either field is missing or the
//! payload is not valid JSON for the expected type. Callers of the bus never
//! see these field names; they exist only here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;

/// Field holding the JSON payload.
pub const PAYLOAD_FIELD: &str = "payload";

/// Field holding the publish timestamp.
pub const PUBLISHED_AT_FIELD: &str = "published_at_utc";

/// A malformed log entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A required envelope field is absent.
    #[error("log entry is missing field '{0}'")]
    MissingField(&'static str),

    /// The payload is not valid JSON for the expected message type.
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),

    /// The message could not be serialised.
    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

/// A decoded envelope: the typed message plus the publish timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    /// The decoded message.
    pub message: T,
    /// When the message was published, ISO-8601.
    pub published_at_utc: String,
}

/// Encode a message into the two-field record appended to the log.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if the message cannot be serialised to
/// JSON (non-string map keys and the like).
pub fn encode<T: Serialize>(
    message: &T,
    published_at: DateTime<Utc>,
) -> Result<Vec<(String, String)>, CodecError> {
    let payload =
        serde_json::to_string(message).map_err(|e| CodecError::Serialize(e.to_string()))?;
    Ok(vec![
        (PAYLOAD_FIELD.to_string(), payload),
        (PUBLISHED_AT_FIELD.to_string(), published_at.to_rfc3339()),
    ])
}

/// Decode a field record read back from the log.
///
/// # Errors
///
/// Returns [`CodecError::MissingField`] when either envelope field is absent
/// and [`CodecError::InvalidPayload`] when the payload does not parse as `T`.
pub fn decode<T: DeserializeOwned>(
    fields: &HashMap<String, String>,
) -> Result<Envelope<T>, CodecError> {
    let payload = fields
        .get(PAYLOAD_FIELD)
        .ok_or(CodecError::MissingField(PAYLOAD_FIELD))?;
    let published_at_utc = fields
        .get(PUBLISHED_AT_FIELD)
        .ok_or(CodecError::MissingField(PUBLISHED_AT_FIELD))?
        .clone();

    let message =
        serde_json::from_str(payload).map_err(|e| CodecError::InvalidPayload(e.to_string()))?;

    Ok(Envelope {
        message,
        published_at_utc,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg {
        id: String,
        value: i64,
        tags: Vec<String>,
    }

    fn to_map(fields: Vec<(String, String)>) -> HashMap<String, String> {
        fields.into_iter().collect()
    }

    #[test]
    fn missing_payload_is_bad_encoding() {
        let mut fields = HashMap::new();
        fields.insert(PUBLISHED_AT_FIELD.to_string(), "2024-01-01T00:00:00Z".into());
        let err = decode::<Msg>(&fields).unwrap_err();
        assert_eq!(err, CodecError::MissingField(PAYLOAD_FIELD));
    }

    #[test]
    fn missing_timestamp_is_bad_encoding() {
        let mut fields = HashMap::new();
        fields.insert(PAYLOAD_FIELD.to_string(), "{}".into());
        let err = decode::<serde_json::Value>(&fields).unwrap_err();
        assert_eq!(err, CodecError::MissingField(PUBLISHED_AT_FIELD));
    }

    #[test]
    fn garbage_payload_is_bad_encoding() {
        let mut fields = HashMap::new();
        fields.insert(PAYLOAD_FIELD.to_string(), "not-json".into());
        fields.insert(PUBLISHED_AT_FIELD.to_string(), "2024-01-01T00:00:00Z".into());
        assert!(matches!(
            decode::<Msg>(&fields),
            Err(CodecError::InvalidPayload(_))
        ));
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(
            id in "[a-z0-9-]{1,24}",
            value in any::<i64>(),
            tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
        ) {
            let msg = Msg { id, value, tags };
            let fields = encode(&msg, Utc::now()).unwrap();
            let envelope: Envelope<Msg> = decode(&to_map(fields)).unwrap();
            prop_assert_eq!(envelope.message, msg);
        }
    }
}
