//! Span blob codec
//!
//! Each persisted row carries the complete span in one text column. The blob
//! is the span's JSON serialization wrapped in base64 so it stays text-safe
//! and never contains quote characters that the literal escaper would strip.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::model::Span;

/// Serialize a span into the text-safe blob stored in the `span` column.
pub fn encode_span(span: &Span) -> Result<String, CodecError> {
    let bytes = serde_json::to_vec(span).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

/// Deserialize a span from its stored blob.
pub fn decode_span(blob: &str) -> Result<Span, CodecError> {
    let bytes = STANDARD
        .decode(blob)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode span: {0}")]
    Encode(String),

    #[error("malformed span blob: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tag, TagValue};

    fn make_span() -> Span {
        Span {
            trace_id: "5b8aa5a2d2c872e8321cf37308d69df2".to_string(),
            span_id: 0x0515_81bf_3cb5_5c13,
            parent_span_id: 42,
            operation_name: "GET /api/users".to_string(),
            flags: 1,
            start_time_unix_nano: 1_544_712_660_000_000_000,
            duration_micros: 7000,
            service_name: "frontend".to_string(),
            tags: vec![
                Tag::new("http.method", TagValue::String("GET".to_string())),
                Tag::new("http.status_code", TagValue::Int64(200)),
                Tag::new("error", TagValue::Bool(false)),
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let span = make_span();
        let blob = encode_span(&span).unwrap();
        let decoded = decode_span(&blob).unwrap();
        assert_eq!(decoded, span);
    }

    #[test]
    fn test_blob_is_quote_free() {
        let blob = encode_span(&make_span()).unwrap();
        assert!(!blob.contains('\''));
        assert!(!blob.contains('"'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_span("!!!"), Err(CodecError::Decode(_))));
        // Valid base64, invalid JSON
        let blob = STANDARD.encode(b"not json");
        assert!(matches!(decode_span(&blob), Err(CodecError::Decode(_))));
    }
}
