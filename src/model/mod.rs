pub mod query;
pub mod span;

pub use query::{Operation, TraceQuery};
pub use span::{Span, Tag, TagValue, Trace};
