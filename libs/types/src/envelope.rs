//! Versioned payload encoding
//!
//! Every broker payload is a JSON envelope:
//!
//! ```text
//! {"schema_version": "1.0.0", "payload": { ... }}
//! ```
//!
//! Readers accept any version with the same major number and ignore fields
//! they do not know, so minor additions stay compatible in both directions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

/// Schema version written by this library.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Major version accepted on decode.
pub const SCHEMA_MAJOR: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub schema_version: String,
    pub payload: T,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: &'a str,
    payload: &'a T,
}

/// Encode a payload inside a current-version envelope.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    let envelope = EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        payload,
    };
    serde_json::to_vec(&envelope).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decode a payload, rejecting envelopes from another major version.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let envelope: Envelope<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let major = envelope.schema_version.split('.').next().unwrap_or_default();
    if major != SCHEMA_MAJOR {
        return Err(CodecError::UnsupportedVersion {
            found: envelope.schema_version,
            supported: SCHEMA_VERSION.to_string(),
        });
    }

    serde_json::from_value(envelope.payload).map_err(|e| CodecError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BoardSide, LeaderboardEvent, RankEntry};
    use crate::ids::Symbol;
    use crate::ticker::RawTicker;
    use chrono::DateTime;
    use uuid::Uuid;

    #[test]
    fn test_envelope_carries_schema_version() {
        let ticker = RawTicker::new(
            Symbol::new("AAPL"),
            190.5,
            DateTime::parse_from_rfc3339("2024-03-04T10:00:00-05:00").unwrap(),
        );
        let bytes = encode(&ticker).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["schema_version"], "1.0.0");
        assert_eq!(value["payload"]["symbol"], "AAPL");
    }

    #[test]
    fn test_leaderboard_event_roundtrip_preserves_order_and_time() {
        let event = LeaderboardEvent {
            event_id: Uuid::now_v7(),
            sequence: 1,
            side: BoardSide::Bottom,
            entries: vec![
                RankEntry::new(Symbol::new("X"), -9.5),
                RankEntry::new(Symbol::new("B"), -2.25),
                RankEntry::new(Symbol::new("Q"), -0.125),
            ],
            event_time: DateTime::parse_from_rfc3339("2024-03-04T15:59:59.250+09:00").unwrap(),
        };

        let decoded: LeaderboardEvent = decode(&encode(&event).unwrap()).unwrap();
        assert_eq!(decoded.entries, event.entries);
        assert_eq!(decoded.event_time, event.event_time);
        assert_eq!(decoded.event_time.offset(), event.event_time.offset());
    }

    #[test]
    fn test_minor_version_accepted_with_unknown_fields() {
        let raw = br#"{"schema_version":"1.4.0","payload":{"symbol":"F","last":12.5,"time":"2024-03-04T10:00:00-05:00","venue":"XNAS"},"trace":"abc"}"#;
        let ticker: RawTicker = decode(raw).unwrap();
        assert_eq!(ticker.symbol.as_str(), "F");
        assert_eq!(ticker.last, 12.5);
    }

    #[test]
    fn test_major_version_rejected() {
        let raw = br#"{"schema_version":"2.0.0","payload":{"symbol":"F","last":12.5,"time":"2024-03-04T10:00:00-05:00"}}"#;
        match decode::<RawTicker>(raw) {
            Err(CodecError::UnsupportedVersion { found, .. }) => assert_eq!(found, "2.0.0"),
            other => panic!("Expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            decode::<RawTicker>(b"\x80\x04pickle"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_payload_shape_mismatch_rejected() {
        let raw = br#"{"schema_version":"1.0.0","payload":{"symbol":"F"}}"#;
        assert!(matches!(decode::<RawTicker>(raw), Err(CodecError::Malformed(_))));
    }

    proptest::proptest! {
        #[test]
        fn test_decode_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let _ = decode::<RawTicker>(&bytes);
        }

        #[test]
        fn test_any_minor_version_decodes(minor in 0u32..100, patch in 0u32..100) {
            let raw = format!(
                r#"{{"schema_version":"1.{}.{}","payload":{{"symbol":"F","last":null,"time":"2024-03-04T10:00:00-05:00"}}}}"#,
                minor, patch
            );
            let ticker: RawTicker = decode(raw.as_bytes()).unwrap();
            proptest::prop_assert!(ticker.last.is_nan());
        }
    }
}
