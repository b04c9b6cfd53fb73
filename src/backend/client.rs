//! REST client for the backend's query/execute endpoint
//!
//! The backend exposes a single `GET /exec?query=...` endpoint that runs one
//! SQL statement per call and answers with a JSON document carrying either a
//! tabular dataset (reads) or an affected-row count (statements).

use serde::Deserialize;
use std::time::Duration;

/// Client for the backend's `/exec` endpoint
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

/// Tabular result of a read query
#[derive(Debug, Clone)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub count: usize,
}

/// Result of an execute statement
#[derive(Debug, Clone, Copy)]
pub struct ExecResult {
    pub affected: u64,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text rendering of one cell; JSON strings are returned unquoted.
    pub fn cell_text(&self, row: usize, col: usize) -> Option<String> {
        self.rows.get(row)?.get(col).map(value_text)
    }

    /// Text rendering of the first column of every row.
    pub fn first_column_text(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.first().map(value_text))
            .collect()
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    name: String,
    #[allow(dead_code)]
    #[serde(rename = "type")]
    type_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    columns: Vec<RawColumn>,
    #[serde(default)]
    dataset: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    count: i64,
    #[serde(default)]
    error: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn exec_request(&self, sql: &str) -> Result<RawResponse, BackendError> {
        let url = format!("{}/exec", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("query", sql)])
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // The backend reports SQL errors as JSON with an `error` field.
            let message = match response.json::<RawResponse>().await {
                Ok(raw) => raw.error.unwrap_or_else(|| status.to_string()),
                Err(_) => status.to_string(),
            };
            return Err(BackendError::Rejected(message));
        }

        response
            .json::<RawResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// Run a read query and return its tabular result.
    pub async fn query(&self, sql: &str) -> Result<RowSet, BackendError> {
        let raw = self.exec_request(sql).await?;
        Ok(RowSet {
            columns: raw.columns.into_iter().map(|c| c.name).collect(),
            rows: raw.dataset,
            count: raw.count.max(0) as usize,
        })
    }

    /// Run a statement (DDL/DML) and return the affected-row count.
    pub async fn execute(&self, sql: &str) -> Result<ExecResult, BackendError> {
        let raw = self.exec_request(sql).await?;
        Ok(ExecResult {
            affected: raw.count.max(0) as u64,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend rejected statement: {0}")]
    Rejected(String),

    #[error("malformed backend response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_query_response() {
        let json = r#"{
            "query": "SELECT trace_id, duration FROM traces",
            "columns": [
                {"name": "trace_id", "type": "SYMBOL"},
                {"name": "duration", "type": "INT"}
            ],
            "dataset": [["abc123", 7000], ["def456", 100]],
            "count": 2
        }"#;

        let raw: RawResponse = serde_json::from_str(json).unwrap();
        let rows = RowSet {
            columns: raw.columns.into_iter().map(|c| c.name).collect(),
            rows: raw.dataset,
            count: raw.count as usize,
        };

        assert_eq!(rows.len(), 2);
        assert_eq!(rows.columns, vec!["trace_id", "duration"]);
        assert_eq!(rows.cell_text(0, 0), Some("abc123".to_string()));
        assert_eq!(rows.cell_text(0, 1), Some("7000".to_string()));
        assert_eq!(rows.cell_text(5, 0), None);
    }

    #[test]
    fn test_decode_ddl_response() {
        let json = r#"{"ddl": "OK"}"#;
        let raw: RawResponse = serde_json::from_str(json).unwrap();
        assert!(raw.dataset.is_empty());
        assert_eq!(raw.count, 0);
    }

    #[test]
    fn test_first_column_text() {
        let rows = RowSet {
            columns: vec!["service_name".to_string()],
            rows: vec![
                vec![serde_json::json!("frontend")],
                vec![serde_json::json!("billing")],
            ],
            count: 2,
        };
        assert_eq!(rows.first_column_text(), vec!["frontend", "billing"]);
    }
}
