//! HTTP upstream source.
//!
//! - [`HttpSource`]: fetches one JSON document per call with a bounded timeout

mod source;

pub use source::{HttpSource, SourceConfig};
