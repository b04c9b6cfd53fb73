//! Span store: ingestion, partitioning, compaction and trace search

pub mod reader;
pub mod table;
pub mod writer;

pub use reader::Reader;
pub use table::{Table, BASE_COLUMNS, MAIN_TABLE};
pub use writer::Writer;

use crate::backend::BackendError;
use crate::codec::CodecError;
use crate::config::LossPolicy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("dropping span: bucket {bucket} already compacted (start time {start_time_unix_nano})")]
    StaleSpan {
        bucket: i64,
        start_time_unix_nano: i64,
    },

    #[error("store not started")]
    NotStarted,
}

/// Apply the configured loss policy to an unrecoverable persistence failure.
///
/// Under `Drop` the loss is logged and ingestion keeps going; under `Fail`
/// the process aborts.
pub(crate) fn report_loss(policy: LossPolicy, context: &str, err: &dyn std::fmt::Display) {
    match policy {
        LossPolicy::Drop => {
            tracing::warn!("{}: {} (data dropped)", context, err);
        }
        LossPolicy::Fail => {
            tracing::error!("{}: {} (loss policy is fail, aborting)", context, err);
            std::process::abort();
        }
    }
}
