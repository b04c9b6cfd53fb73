//! Bucket-routing span writer with periodic compaction
//!
//! One writer instance owns the main table plus a rotating set of
//! time-bucketed partition tables. Incoming spans route to the partition
//! matching their start-time bucket; a background task periodically merges
//! the closed bucket into the main table and drops it. Bucket keys only
//! move forward: spans for an already-compacted bucket are rejected, not
//! backfilled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;

use super::table::{Table, MAIN_TABLE};
use super::{report_loss, StoreError};
use crate::backend::RestClient;
use crate::config::Options;
use crate::model::Span;

/// Bucket-keyed partition map plus the tracked current bucket. Only touched
/// with the partition lock held.
struct PartitionSet {
    current: i64,
    tables: HashMap<i64, Arc<Table>>,
}

/// Routes spans to time-bucket partitions and compacts closed buckets into
/// the main table.
pub struct Writer {
    client: Arc<RestClient>,
    options: Options,
    main: Arc<Table>,
    partitions: RwLock<PartitionSet>,
    spans_since_flush: AtomicUsize,
    running: Arc<AtomicBool>,
}

// Valid until 2262; the backend's timestamp domain runs out first.
fn now_unix_nano() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn partition_name(bucket: i64) -> String {
    format!("partition_{}", bucket)
}

impl Writer {
    pub fn new(client: Arc<RestClient>, options: Options) -> Self {
        let main = Arc::new(Table::new(
            Arc::clone(&client),
            MAIN_TABLE,
            options.loss_policy,
        ));
        Self {
            client,
            options,
            main,
            partitions: RwLock::new(PartitionSet {
                current: 0,
                tables: HashMap::new(),
            }),
            spans_since_flush: AtomicUsize::new(0),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn bucket_key(&self, unix_nano: i64) -> i64 {
        unix_nano / self.options.bucket_width_nanos()
    }

    fn new_partition(&self, bucket: i64) -> Arc<Table> {
        Arc::new(Table::new(
            Arc::clone(&self.client),
            partition_name(bucket),
            self.options.loss_policy,
        ))
    }

    /// Ensure the main table, open the current bucket's partition, and spawn
    /// the compaction loop. Returns the loop's join handle.
    pub async fn start(self: Arc<Self>) -> Result<tokio::task::JoinHandle<()>, StoreError> {
        self.main.create_if_missing(true).await?;

        let bucket = self.bucket_key(now_unix_nano());
        let partition = self.new_partition(bucket);
        partition.create_if_missing(false).await?;
        partition.truncate().await?;

        {
            let mut set = self.partitions.write().await;
            set.current = bucket;
            set.tables.clear();
            set.tables.insert(bucket, partition);
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            tracing::info!(
                "compaction worker started, bucket width {}s",
                self.options.bucket_width_secs
            );

            let period = Duration::from_secs(self.options.bucket_width_secs);
            let mut interval = time::interval(period);
            // First tick completes immediately; skip it.
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                self.compact().await;
            }

            tracing::info!("compaction worker stopped");
        });
        Ok(handle)
    }

    /// Signal the compaction loop to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Route a span to its bucket's partition and buffer it there.
    ///
    /// Spans for a bucket older than the tracked current bucket are rejected
    /// with `StoreError::StaleSpan`; nothing is written or buffered for them.
    pub async fn write_span(&self, span: &Span) -> Result<(), StoreError> {
        let bucket = self.bucket_key(span.start_time_unix_nano);

        let table = {
            let set = self.partitions.read().await;
            match set.tables.get(&bucket) {
                Some(table) => Some(Arc::clone(table)),
                None if bucket <= set.current => {
                    return Err(StoreError::StaleSpan {
                        bucket,
                        start_time_unix_nano: span.start_time_unix_nano,
                    });
                }
                None => None,
            }
        };

        let table = match table {
            Some(table) => table,
            // Newer bucket: lazily open its partition, synchronized against
            // concurrent creation.
            None => {
                let mut set = self.partitions.write().await;
                if let Some(table) = set.tables.get(&bucket) {
                    Arc::clone(table)
                } else if bucket <= set.current {
                    return Err(StoreError::StaleSpan {
                        bucket,
                        start_time_unix_nano: span.start_time_unix_nano,
                    });
                } else {
                    let table = self.new_partition(bucket);
                    table.create_if_missing(false).await?;
                    set.tables.insert(bucket, Arc::clone(&table));
                    table
                }
            }
        };

        table.write_span(span)?;

        let written = self.spans_since_flush.fetch_add(1, Ordering::Relaxed) + 1;
        if written % self.options.flush_max_rows == 0 {
            table.flush();
        }
        Ok(())
    }

    /// One compaction cycle: advance the current bucket to "now", pull the
    /// previous current partition out of the map, then merge it into the
    /// main table and drop it. A failed merge still drops the partition;
    /// compaction never retries and never blocks the next cycle.
    pub async fn compact(&self) {
        let closed = {
            let mut set = self.partitions.write().await;
            let now_bucket = self.bucket_key(now_unix_nano());
            if now_bucket <= set.current {
                // Clock has not crossed into a new bucket; nothing to close.
                return;
            }

            let current = set.current;
            let closed = set.tables.remove(&current);
            set.current = now_bucket;

            if !set.tables.contains_key(&now_bucket) {
                let table = self.new_partition(now_bucket);
                if let Err(e) = table.create_if_missing(false).await {
                    tracing::warn!("failed to open partition {}: {}", table.name(), e);
                }
                set.tables.insert(now_bucket, table);
            }
            closed
        };

        let Some(partition) = closed else {
            return;
        };

        tracing::info!("compacting {} into {}", partition.name(), MAIN_TABLE);

        // Push buffered rows out before the merge reads the partition.
        partition.flush_wait().await;

        if let Err(e) = self.main.merge_from(&partition).await {
            report_loss(
                self.options.loss_policy,
                &format!("compaction merge of {} failed", partition.name()),
                &e,
            );
        }

        // Dropped regardless of merge success; bucket names are never reused.
        if let Err(e) = partition.drop_table().await {
            tracing::warn!("failed to drop {}: {}", partition.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LossPolicy;
    use crate::model::{Tag, TagValue};

    fn test_client() -> Arc<RestClient> {
        Arc::new(RestClient::new(
            "http://127.0.0.1:1",
            Duration::from_millis(100),
        ))
    }

    fn test_options() -> Options {
        Options {
            backend_url: "http://127.0.0.1:1".to_string(),
            bucket_width_secs: 60,
            flush_max_rows: 1024,
            http_timeout_secs: 1,
            loss_policy: LossPolicy::Drop,
        }
    }

    fn span_in_bucket(bucket: i64, width_nanos: i64) -> Span {
        Span {
            trace_id: "5b8aa5a2d2c872e8321cf37308d69df2".to_string(),
            span_id: 1,
            parent_span_id: 0,
            operation_name: "op".to_string(),
            flags: 0,
            start_time_unix_nano: bucket * width_nanos + 1,
            duration_micros: 100,
            service_name: "svc".to_string(),
            tags: vec![Tag::new("env", TagValue::String("prod".to_string()))],
        }
    }

    /// Put the writer at a known current bucket without touching the network.
    async fn prime(writer: &Writer, bucket: i64) -> Arc<Table> {
        let table = writer.new_partition(bucket);
        let mut set = writer.partitions.write().await;
        set.current = bucket;
        set.tables.clear();
        set.tables.insert(bucket, Arc::clone(&table));
        table
    }

    #[test]
    fn test_bucket_key() {
        let writer = Writer::new(test_client(), test_options());
        let width = 60_000_000_000i64;
        assert_eq!(writer.bucket_key(0), 0);
        assert_eq!(writer.bucket_key(width - 1), 0);
        assert_eq!(writer.bucket_key(width), 1);
        assert_eq!(writer.bucket_key(100 * width + 5), 100);
    }

    #[tokio::test]
    async fn test_write_routes_to_existing_partition() {
        let writer = Writer::new(test_client(), test_options());
        let width = writer.options.bucket_width_nanos();
        let table = prime(&writer, 100).await;

        writer.write_span(&span_in_bucket(100, width)).await.unwrap();
        assert_eq!(table.buffered_rows(), 1);
    }

    #[tokio::test]
    async fn test_stale_span_rejected_without_mutation() {
        let writer = Writer::new(test_client(), test_options());
        let width = writer.options.bucket_width_nanos();
        let table = prime(&writer, 100).await;

        let err = writer
            .write_span(&span_in_bucket(99, width))
            .await
            .unwrap_err();
        match err {
            StoreError::StaleSpan { bucket, .. } => assert_eq!(bucket, 99),
            other => panic!("expected StaleSpan, got {:?}", other),
        }
        assert_eq!(table.buffered_rows(), 0);
        assert!(writer.partitions.read().await.tables.get(&99).is_none());
    }

    #[tokio::test]
    async fn test_current_bucket_bound_is_exclusive() {
        // Bucket equal to current but with no live partition is stale too;
        // current buckets always carry their partition while active.
        let writer = Writer::new(test_client(), test_options());
        let width = writer.options.bucket_width_nanos();
        {
            let mut set = writer.partitions.write().await;
            set.current = 100;
            set.tables.clear();
        }

        let err = writer
            .write_span(&span_in_bucket(100, width))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleSpan { bucket: 100, .. }));
    }

    #[tokio::test]
    async fn test_flush_threshold_drains_buffer() {
        let mut options = test_options();
        options.flush_max_rows = 2;
        let writer = Writer::new(test_client(), options);
        let width = writer.options.bucket_width_nanos();
        let table = prime(&writer, 100).await;

        writer.write_span(&span_in_bucket(100, width)).await.unwrap();
        assert_eq!(table.buffered_rows(), 1);

        // Second write crosses the threshold: buffer swapped out for the
        // background drain (which fails against the unroutable client and
        // drops the rows under the Drop policy).
        writer.write_span(&span_in_bucket(100, width)).await.unwrap();
        assert_eq!(table.buffered_rows(), 0);
    }

    #[tokio::test]
    async fn test_stop_clears_running_flag() {
        let writer = Writer::new(test_client(), test_options());
        writer.running.store(true, Ordering::SeqCst);
        assert!(writer.is_running());
        writer.stop();
        assert!(!writer.is_running());
    }
}
