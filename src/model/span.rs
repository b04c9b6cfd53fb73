//! Span data model
//!
//! A span is one timed operation; a trace is the set of spans sharing a
//! trace identifier. Spans are produced upstream and consumed read-only by
//! this store.

use serde::{Deserialize, Serialize};

/// A single timed operation within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// 32 hex character trace ID
    pub trace_id: String,
    pub span_id: u64,
    /// Zero if this is a root span
    pub parent_span_id: u64,
    pub operation_name: String,
    pub flags: u32,
    /// Start instant, nanoseconds since epoch
    pub start_time_unix_nano: i64,
    /// Elapsed time in microseconds
    pub duration_micros: i64,
    pub service_name: String,
    /// Ordered tag sequence; keys are not guaranteed unique before dedup
    pub tags: Vec<Tag>,
}

/// One key/value tag on a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: TagValue,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: TagValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Tag value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
}

impl TagValue {
    /// Text rendering used when the value is persisted as a string column.
    pub fn as_text(&self) -> String {
        match self {
            TagValue::String(s) => s.clone(),
            TagValue::Int64(i) => i.to_string(),
            TagValue::Float64(f) => f.to_string(),
            TagValue::Bool(b) => b.to_string(),
        }
    }
}

/// All spans sharing one trace identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub spans: Vec<Span>,
}
