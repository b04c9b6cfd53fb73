//! One named relation on the backend
//!
//! A table knows its live column set, can grow it additively as new tag
//! columns appear, and buffers single-span writes in memory until flushed.
//! The buffer lock is only ever held for in-memory work; the backend lock
//! serializes schema reconciliation against inserts and merges so a flush
//! never races a column add on the same table.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use super::{report_loss, StoreError};
use crate::backend::sql::{quote, tag_column};
use crate::backend::{BackendError, RestClient};
use crate::codec::encode_span;
use crate::config::LossPolicy;
use crate::model::Span;

/// Name of the long-lived, time-ordered main table.
pub const MAIN_TABLE: &str = "traces";

/// Fixed base columns, in persisted order. Tag columns come after these.
pub const BASE_COLUMNS: [&str; 9] = [
    "trace_id",
    "span_id",
    "parent_id",
    "operation_name",
    "flags",
    "start_time",
    "duration",
    "service_name",
    "span",
];

/// One encoded row waiting to be flushed: the row's tag columns and the
/// pre-escaped literal for every column (base columns first).
#[derive(Debug, Clone)]
pub(crate) struct BufferedRow {
    pub tag_columns: Vec<String>,
    pub values: Vec<String>,
}

/// A named relation: either the main table or one time-bucket partition
pub struct Table {
    client: Arc<RestClient>,
    name: String,
    loss_policy: LossPolicy,
    /// Serializes schema reconciliation against inserts and merges.
    backend_lock: AsyncMutex<()>,
    /// Rows written but not yet flushed. Never held across an await.
    buffer: Mutex<Vec<BufferedRow>>,
}

impl Table {
    pub fn new(client: Arc<RestClient>, name: impl Into<String>, loss_policy: LossPolicy) -> Self {
        Self {
            client,
            name: name.into(),
            loss_policy,
            backend_lock: AsyncMutex::new(()),
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of buffered, not-yet-flushed rows.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Live column set as the backend reports it.
    pub async fn columns(&self) -> Result<Vec<String>, BackendError> {
        let sql = format!("SELECT column FROM table_columns('{}')", self.name);
        let rows = self.client.query(&sql).await?;
        Ok(rows.first_column_text())
    }

    /// Subset of `candidates` not yet present on the backend.
    pub async fn columns_needed(
        &self,
        candidates: &[String],
    ) -> Result<Vec<String>, BackendError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let quoted: Vec<String> = candidates.iter().map(|c| quote(c)).collect();
        let sql = format!(
            "SELECT column FROM table_columns('{}') WHERE column IN ( {} )",
            self.name,
            quoted.join(",")
        );
        let rows = self.client.query(&sql).await?;
        let present: std::collections::HashSet<String> =
            rows.first_column_text().into_iter().collect();
        Ok(candidates
            .iter()
            .filter(|c| !present.contains(*c))
            .cloned()
            .collect())
    }

    /// Add the missing subset of `candidates` as string columns, one ALTER
    /// statement for all of them. Takes the backend lock.
    pub async fn ensure_columns(&self, candidates: &[String]) -> Result<(), BackendError> {
        let _guard = self.backend_lock.lock().await;
        self.ensure_columns_inner(candidates).await
    }

    /// Column reconciliation body; caller holds the backend lock.
    async fn ensure_columns_inner(&self, candidates: &[String]) -> Result<(), BackendError> {
        let missing = self.columns_needed(candidates).await?;
        if missing.is_empty() {
            return Ok(());
        }
        let specs: Vec<String> = missing.iter().map(|c| format!("{} STRING", c)).collect();
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.name,
            specs.join(" , ")
        );
        self.client.execute(&sql).await?;
        Ok(())
    }

    /// Exact-name scan of the backend's table listing.
    pub async fn exists(&self) -> Result<bool, BackendError> {
        let rows = self.client.query("SHOW TABLES").await?;
        Ok(rows
            .first_column_text()
            .iter()
            .any(|t| t == &self.name))
    }

    async fn create(&self, time_ordered: bool) -> Result<(), BackendError> {
        let designated = if time_ordered {
            " timestamp(start_time)"
        } else {
            ""
        };
        let sql = format!(
            "CREATE TABLE {} ( \
             trace_id symbol index, \
             span_id long, \
             parent_id long, \
             operation_name string, \
             service_name symbol, \
             flags int, \
             start_time timestamp, \
             duration int, \
             span string ){}",
            self.name, designated
        );
        self.client.execute(&sql).await?;
        Ok(())
    }

    /// Create the table with the fixed base schema if it does not exist.
    /// `time_ordered` marks start_time as the backend's partitioning key;
    /// only the main table uses it.
    pub async fn create_if_missing(&self, time_ordered: bool) -> Result<(), BackendError> {
        if self.exists().await? {
            return Ok(());
        }
        self.create(time_ordered).await
    }

    pub async fn drop_table(&self) -> Result<(), BackendError> {
        let sql = format!("DROP TABLE {}", self.name);
        self.client.execute(&sql).await?;
        Ok(())
    }

    pub async fn truncate(&self) -> Result<(), BackendError> {
        let sql = format!("TRUNCATE TABLE {}", self.name);
        self.client.execute(&sql).await?;
        Ok(())
    }

    /// Encode a span and append it to the in-memory buffer. Tag keys that
    /// sanitize to the same column name dedup last-write-wins. Never touches
    /// the network.
    pub fn write_span(&self, span: &Span) -> Result<(), StoreError> {
        // Last-write-wins dedup on the sanitized column name.
        let mut tags: HashMap<String, String> = HashMap::with_capacity(span.tags.len());
        for tag in &span.tags {
            tags.insert(tag_column(&tag.key), quote(&tag.value.as_text()));
        }
        let mut tag_columns = Vec::with_capacity(tags.len());
        let mut tag_values = Vec::with_capacity(tags.len());
        for (column, value) in tags {
            tag_columns.push(column);
            tag_values.push(value);
        }

        let blob = encode_span(span)?;

        let mut values = vec![
            quote(&span.trace_id),
            span.span_id.to_string(),
            span.parent_span_id.to_string(),
            quote(&span.operation_name),
            span.flags.to_string(),
            // start_time column takes epoch microseconds
            (span.start_time_unix_nano / 1000).to_string(),
            span.duration_micros.to_string(),
            quote(&span.service_name),
            quote(&blob),
        ];
        values.extend(tag_values);

        self.buffer.lock().push(BufferedRow { tag_columns, values });
        Ok(())
    }

    /// Swap the buffer for an empty one and drain the swapped-out rows in a
    /// background task. Writers immediately fill the fresh buffer; the swap
    /// is the only work done under the buffer lock.
    pub fn flush(self: Arc<Self>) {
        let rows = std::mem::take(&mut *self.buffer.lock());
        if rows.is_empty() {
            return;
        }
        tokio::spawn(async move {
            self.drain(rows).await;
        });
    }

    /// Swap and drain inline. Compaction uses this so a closed bucket's
    /// buffered rows reach the backend before the merge.
    pub async fn flush_wait(&self) {
        let rows = std::mem::take(&mut *self.buffer.lock());
        if rows.is_empty() {
            return;
        }
        self.drain(rows).await;
    }

    /// Per row: reconcile columns, then insert exactly that row's columns.
    /// A failed row goes through the loss policy and never aborts the rest.
    async fn drain(&self, rows: Vec<BufferedRow>) {
        for row in rows {
            let _guard = self.backend_lock.lock().await;

            if let Err(e) = self.ensure_columns_inner(&row.tag_columns).await {
                report_loss(
                    self.loss_policy,
                    &format!("schema reconciliation failed on {}", self.name),
                    &e,
                );
                continue;
            }

            let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
            columns.extend(row.tag_columns.iter().map(String::as_str));
            let sql = format!(
                "INSERT INTO {} ( {} ) VALUES ( {} )",
                self.name,
                columns.join(","),
                row.values.join(",")
            );

            if let Err(e) = self.client.execute(&sql).await {
                report_loss(
                    self.loss_policy,
                    &format!("row insert failed on {}", self.name),
                    &e,
                );
            }
        }
    }

    /// Merge a closed partition into this table: reconcile the partition's
    /// live columns onto self, then copy its rows ordered by start time.
    /// Holds both tables' backend locks for the duration.
    pub async fn merge_from(&self, partition: &Table) -> Result<(), StoreError> {
        let _own = self.backend_lock.lock().await;
        let _theirs = partition.backend_lock.lock().await;

        let columns = partition.columns().await?;
        self.ensure_columns_inner(&columns).await?;

        let sql = format!(
            "INSERT INTO {} SELECT * FROM ({} ORDER BY start_time)",
            self.name, partition.name
        );
        self.client.execute(&sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tag, TagValue};
    use std::time::Duration;

    fn test_client() -> Arc<RestClient> {
        Arc::new(RestClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(100),
        ))
    }

    fn make_span(tags: Vec<Tag>) -> Span {
        Span {
            trace_id: "5b8aa5a2d2c872e8321cf37308d69df2".to_string(),
            span_id: 7,
            parent_span_id: 0,
            operation_name: "GET /api".to_string(),
            flags: 1,
            start_time_unix_nano: 6_000_000_000_000,
            duration_micros: 7000,
            service_name: "frontend".to_string(),
            tags,
        }
    }

    #[test]
    fn test_write_span_buffers_locally() {
        let table = Table::new(test_client(), "partition_100", LossPolicy::Drop);
        table.write_span(&make_span(vec![])).unwrap();
        table.write_span(&make_span(vec![])).unwrap();
        assert_eq!(table.buffered_rows(), 2);
    }

    #[test]
    fn test_write_span_base_values() {
        let table = Table::new(test_client(), "traces", LossPolicy::Drop);
        table.write_span(&make_span(vec![])).unwrap();

        let buffer = table.buffer.lock();
        let row = &buffer[0];
        assert!(row.tag_columns.is_empty());
        assert_eq!(row.values.len(), BASE_COLUMNS.len());
        assert_eq!(row.values[0], "'5b8aa5a2d2c872e8321cf37308d69df2'");
        assert_eq!(row.values[1], "7");
        assert_eq!(row.values[3], "'GET /api'");
        // start_time stored as epoch microseconds
        assert_eq!(row.values[5], "6000000000");
        assert_eq!(row.values[6], "7000");
        assert_eq!(row.values[7], "'frontend'");
    }

    #[test]
    fn test_colliding_tag_keys_last_write_wins() {
        let table = Table::new(test_client(), "traces", LossPolicy::Drop);
        // "env.name" and "env#name" sanitize to the same column
        let span = make_span(vec![
            Tag::new("env.name", TagValue::String("staging".to_string())),
            Tag::new("env#name", TagValue::String("prod".to_string())),
        ]);
        table.write_span(&span).unwrap();

        let buffer = table.buffer.lock();
        let row = &buffer[0];
        assert_eq!(row.tag_columns, vec!["__tag_env#name"]);
        assert_eq!(row.values.len(), BASE_COLUMNS.len() + 1);
        assert_eq!(row.values[BASE_COLUMNS.len()], "'prod'");
    }

    #[test]
    fn test_tag_columns_and_values_stay_aligned() {
        let table = Table::new(test_client(), "traces", LossPolicy::Drop);
        let span = make_span(vec![
            Tag::new("http.method", TagValue::String("GET".to_string())),
            Tag::new("http.status_code", TagValue::Int64(200)),
        ]);
        table.write_span(&span).unwrap();

        let buffer = table.buffer.lock();
        let row = &buffer[0];
        assert_eq!(row.tag_columns.len(), 2);
        for (i, column) in row.tag_columns.iter().enumerate() {
            let value = &row.values[BASE_COLUMNS.len() + i];
            match column.as_str() {
                "__tag_http#method" => assert_eq!(value, "'GET'"),
                "__tag_http#status_code" => assert_eq!(value, "'200'"),
                other => panic!("unexpected tag column {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_flush_swaps_buffer_immediately() {
        let table = Arc::new(Table::new(test_client(), "traces", LossPolicy::Drop));
        table.write_span(&make_span(vec![])).unwrap();
        assert_eq!(table.buffered_rows(), 1);

        // The drain runs in the background (and fails against the unroutable
        // client, dropping the row); the swap itself is synchronous.
        Arc::clone(&table).flush();
        assert_eq!(table.buffered_rows(), 0);
    }
}
