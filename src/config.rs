//! Runtime configuration
//!
//! Environment variables:
//! - SPANSINK_BACKEND_URL: Base URL of the backend REST endpoint (default: http://127.0.0.1:9000)
//! - SPANSINK_BUCKET_WIDTH_SECS: Width of one partition time bucket (default: 60)
//! - SPANSINK_FLUSH_MAX_ROWS: Buffered spans per flush cycle (default: 1024)
//! - SPANSINK_HTTP_TIMEOUT_SECS: Backend request timeout (default: 60)
//! - SPANSINK_LOSS_POLICY: "drop" or "fail" (default: drop)

use std::time::Duration;

/// What to do when a buffered row or a closed bucket cannot be persisted.
///
/// The store trades durability for availability: a flush or compaction
/// failure does not stall ingestion. This policy decides whether the loss is
/// survivable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossPolicy {
    /// Log the loss and keep going (default).
    #[default]
    Drop,
    /// Abort the process; losing data is not acceptable here.
    Fail,
}

impl LossPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Some(LossPolicy::Drop),
            "fail" => Some(LossPolicy::Fail),
            _ => None,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct Options {
    pub backend_url: String,
    pub bucket_width_secs: u64,
    pub flush_max_rows: usize,
    pub http_timeout_secs: u64,
    pub loss_policy: LossPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:9000".to_string(),
            bucket_width_secs: 60,
            flush_max_rows: 1024,
            http_timeout_secs: 60,
            loss_policy: LossPolicy::Drop,
        }
    }
}

impl Options {
    /// Build options from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend_url =
            std::env::var("SPANSINK_BACKEND_URL").unwrap_or(defaults.backend_url);
        let bucket_width_secs = std::env::var("SPANSINK_BUCKET_WIDTH_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.bucket_width_secs);
        let flush_max_rows = std::env::var("SPANSINK_FLUSH_MAX_ROWS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.flush_max_rows);
        let http_timeout_secs = std::env::var("SPANSINK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults.http_timeout_secs);
        let loss_policy = std::env::var("SPANSINK_LOSS_POLICY")
            .ok()
            .and_then(|v| LossPolicy::parse(&v))
            .unwrap_or(defaults.loss_policy);

        Self {
            backend_url,
            bucket_width_secs,
            flush_max_rows,
            http_timeout_secs,
            loss_policy,
        }
    }

    pub fn bucket_width_nanos(&self) -> i64 {
        self.bucket_width_secs as i64 * 1_000_000_000
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
