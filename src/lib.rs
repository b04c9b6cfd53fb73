//! Spansink: span storage over a SQL-over-HTTP analytical backend
//!
//! Ingests distributed-tracing spans into a time-partitioned store reachable
//! only through a query/execute REST endpoint, and answers trace-search
//! queries against it. The backend offers nothing beyond create table /
//! insert / select, so everything else lives here:
//!
//! - **Buffered concurrent writes**: spans append to an in-memory buffer and
//!   drain to the backend off the write path
//! - **Schema evolution**: new tag keys become new string columns, added
//!   additively and re-checked before every insert
//! - **Time-bucket partitioning**: spans route to per-minute partition
//!   tables that a background worker merges into the durable main table
//! - **Trace search**: structured queries translate into textual conditions,
//!   with a column-catalog probe standing in for secondary indexes on
//!   dynamic tag columns
//!
//! # Example
//!
//! ```no_run
//! use spansink::{Factory, Options, TraceQuery};
//!
//! # async fn run() -> Result<(), spansink::StoreError> {
//! let mut factory = Factory::new(Options::from_env());
//! factory.initialize().await?;
//!
//! let writer = factory.span_writer()?;
//! let reader = factory.span_reader();
//! let services = reader.get_services().await?;
//! let traces = reader.find_traces(&TraceQuery::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod factory;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use config::{LossPolicy, Options};
pub use factory::Factory;
pub use model::{Span, Tag, TagValue, Trace, TraceQuery};
pub use store::{Reader, StoreError, Writer};
