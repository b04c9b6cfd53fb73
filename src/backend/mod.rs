pub mod client;
pub mod sql;

pub use client::{BackendError, ExecResult, RestClient, RowSet};
