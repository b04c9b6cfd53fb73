//! Trace-search request shapes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured trace-search request.
///
/// A zero value means "unset" for every bound; empty strings mean "no
/// filter" for the name fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceQuery {
    pub service_name: String,
    pub operation_name: String,
    /// Tag equality filters, original (unsanitized) keys
    pub tags: HashMap<String, String>,
    pub start_time_min_unix_nano: i64,
    pub start_time_max_unix_nano: i64,
    pub duration_min_micros: i64,
    pub duration_max_micros: i64,
}

/// A named operation within a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
}
