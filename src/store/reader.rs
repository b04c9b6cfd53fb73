//! Trace search against the main table
//!
//! The backend has no query planning over dynamic columns, so search runs in
//! two phases: a distinct trace-id selection under the assembled condition,
//! then a full-row fetch of those ids. Tag filters resolve through a column
//! catalog probe first; a filter whose column was never written is silently
//! dropped, and if none of the requested tag columns exist the search
//! short-circuits to an empty result without touching the row data.

use std::collections::HashMap;
use std::sync::Arc;

use super::table::MAIN_TABLE;
use super::StoreError;
use crate::backend::sql::{quote, tag_column, timestamp_literal};
use crate::backend::RestClient;
use crate::codec::decode_span;
use crate::model::{Operation, Trace, TraceQuery};

/// Upper bound used when a query sets no explicit start-time maximum
/// (2100-01-01T00:00:00Z).
const DEFAULT_TIME_MAX_UNIX_NANO: i64 = 4_102_444_800_000_000_000;

/// Read-side surface over the main table
#[derive(Debug, Clone)]
pub struct Reader {
    client: Arc<RestClient>,
}

/// Conditions derivable without consulting the backend: duration range,
/// the always-present start-time range, and the name equalities.
fn base_conditions(query: &TraceQuery) -> Vec<String> {
    let mut conditions = Vec::new();

    if query.duration_min_micros > 0 {
        conditions.push(format!("duration >= {}", query.duration_min_micros));
    }
    if query.duration_max_micros > 0 {
        conditions.push(format!("duration <= {}", query.duration_max_micros));
    }

    // The time range is always present; unset bounds cover the full domain.
    let time_min = query.start_time_min_unix_nano.max(0);
    let time_max = if query.start_time_max_unix_nano > 0 {
        query.start_time_max_unix_nano
    } else {
        DEFAULT_TIME_MAX_UNIX_NANO
    };
    conditions.push(format!("start_time >= {}", timestamp_literal(time_min)));
    conditions.push(format!("start_time <= {}", timestamp_literal(time_max)));

    if !query.operation_name.is_empty() {
        conditions.push(format!("operation_name = {}", quote(&query.operation_name)));
    }
    if !query.service_name.is_empty() {
        conditions.push(format!("service_name = {}", quote(&query.service_name)));
    }

    conditions
}

/// Decide which requested tag filters survive the catalog probe. `probed`
/// holds the live column names the probe returned; `wanted` maps each
/// requested column name to its escaped equality value. `None` means none of
/// the requested columns exist, so the search can have no results; columns
/// the probe did not return are dropped, not treated as no-match.
fn select_tag_conditions(
    probed: Vec<String>,
    wanted: &HashMap<String, String>,
) -> Option<Vec<(String, String)>> {
    if probed.is_empty() {
        return None;
    }
    let mut resolved = Vec::with_capacity(probed.len());
    for column in probed {
        if let Some(value) = wanted.get(&column) {
            resolved.push((column, value.clone()));
        }
    }
    Some(resolved)
}

/// Group fetched `(trace_id, span blob)` rows into traces. Span order within
/// a trace follows row order; trace order is unspecified.
fn group_rows(rows: Vec<(String, String)>) -> Result<Vec<Trace>, StoreError> {
    let mut traces: HashMap<String, Trace> = HashMap::new();
    for (trace_id, blob) in rows {
        let span = decode_span(&blob)?;
        traces.entry(trace_id).or_default().spans.push(span);
    }
    Ok(traces.into_values().collect())
}

impl Reader {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }

    /// Resolve requested tag filters against the main table's live column
    /// catalog. `None` means none of the requested columns exist, so the
    /// search can have no results. Unresolved filters are dropped.
    async fn resolve_tag_columns(
        &self,
        tags: &HashMap<String, String>,
    ) -> Result<Option<Vec<(String, String)>>, StoreError> {
        if tags.is_empty() {
            return Ok(Some(Vec::new()));
        }

        // Escaped equality value, keyed by the exact column name the probe
        // will hand back.
        let mut wanted: HashMap<String, String> = HashMap::with_capacity(tags.len());
        for (key, value) in tags {
            wanted.insert(tag_column(key), quote(value));
        }

        let probe_list: Vec<String> = wanted.keys().map(|c| quote(c)).collect();
        let sql = format!(
            "SELECT column FROM table_columns('{}') WHERE column IN ( {} )",
            MAIN_TABLE,
            probe_list.join(",")
        );
        let rows = self.client.query(&sql).await?;
        Ok(select_tag_conditions(rows.first_column_text(), &wanted))
    }

    /// Assemble the full search condition. `None` short-circuits the search:
    /// a tag filter set resolved to zero live columns.
    async fn build_condition(&self, query: &TraceQuery) -> Result<Option<String>, StoreError> {
        let mut conditions = base_conditions(query);

        match self.resolve_tag_columns(&query.tags).await? {
            None => return Ok(None),
            Some(resolved) => {
                for (column, value) in resolved {
                    conditions.push(format!("{} = {}", column, value));
                }
            }
        }

        Ok(Some(conditions.join(" AND ")))
    }

    /// Phase 1: distinct trace ids matching the query.
    pub async fn find_trace_ids(&self, query: &TraceQuery) -> Result<Vec<String>, StoreError> {
        let Some(condition) = self.build_condition(query).await? else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT DISTINCT trace_id FROM {} WHERE {}",
            MAIN_TABLE, condition
        );
        let rows = self.client.query(&sql).await?;
        Ok(rows.first_column_text())
    }

    /// Phase 1 + phase 2: full traces matching the query. Empty result sets
    /// are not an error, and phase 2 is skipped entirely for them.
    pub async fn find_traces(&self, query: &TraceQuery) -> Result<Vec<Trace>, StoreError> {
        let ids = self.find_trace_ids(query).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_traces(&ids).await
    }

    /// Fetch one trace by id. `None` when no rows carry the id.
    pub async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, StoreError> {
        let mut traces = self.fetch_traces(&[trace_id.to_string()]).await?;
        Ok(traces.pop())
    }

    /// Phase 2: fetch `(trace_id, span)` rows for the given ids, decode the
    /// blobs, and group spans by trace id.
    async fn fetch_traces(&self, ids: &[String]) -> Result<Vec<Trace>, StoreError> {
        let quoted: Vec<String> = ids.iter().map(|id| quote(id)).collect();
        let sql = format!(
            "SELECT trace_id, span FROM {} WHERE trace_id IN ( {} )",
            MAIN_TABLE,
            quoted.join(",")
        );
        let rows = self.client.query(&sql).await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            let (Some(trace_id), Some(blob)) = (rows.cell_text(i, 0), rows.cell_text(i, 1))
            else {
                continue;
            };
            pairs.push((trace_id, blob));
        }
        group_rows(pairs)
    }

    /// Distinct service names across the main table.
    pub async fn get_services(&self) -> Result<Vec<String>, StoreError> {
        let sql = format!("SELECT DISTINCT service_name FROM {}", MAIN_TABLE);
        let rows = self.client.query(&sql).await?;
        Ok(rows.first_column_text())
    }

    /// Distinct operation names, optionally restricted to one service.
    pub async fn get_operations(&self, service_name: &str) -> Result<Vec<Operation>, StoreError> {
        let sql = if service_name.is_empty() {
            format!("SELECT DISTINCT operation_name FROM {}", MAIN_TABLE)
        } else {
            format!(
                "SELECT DISTINCT operation_name FROM {} WHERE service_name = {}",
                MAIN_TABLE,
                quote(service_name)
            )
        };
        let rows = self.client.query(&sql).await?;
        Ok(rows
            .first_column_text()
            .into_iter()
            .map(|name| Operation { name })
            .collect())
    }
}
