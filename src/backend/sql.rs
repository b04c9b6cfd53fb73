//! SQL text helpers: identifier sanitization and literal escaping
//!
//! The backend rejects `.`, `/` and `\` in column identifiers, so tag keys
//! are rewritten before they become column names. Escaping here strips
//! embedded quote characters rather than doubling them; this is NOT safe
//! against adversarial input and is a documented limitation of the store.

use chrono::DateTime;

/// Prefix for dynamically-created tag columns, keeping them disjoint from
/// the fixed base columns.
pub const TAG_PREFIX: &str = "__tag";

/// Rewrite a tag key into a backend-legal column identifier.
///
/// Idempotent: sanitizing an already-sanitized key is a no-op.
pub fn sanitize_tag_key(key: &str) -> String {
    key.replace(['.', '/', '\\'], "#")
}

/// Full column name for a tag key: `__tag_<sanitized-key>`.
pub fn tag_column(key: &str) -> String {
    format!("{}_{}", TAG_PREFIX, sanitize_tag_key(key))
}

/// Quote a string literal, stripping any embedded single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', ""))
}

/// Render a nanosecond instant as a quoted UTC timestamp literal.
pub fn timestamp_literal(unix_nano: i64) -> String {
    let ts = DateTime::from_timestamp_nanos(unix_nano);
    format!("'{}'", ts.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
}
