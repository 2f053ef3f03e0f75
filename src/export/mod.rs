//! Scroll export engine
//!
//! One export runs a strictly sequential loop:
//!
//! ```text
//! QueryBuilder -> SearchEndpoint -> PageDecoder -> Projection -> RecordEncoder -> CompressionSink
//!       ^                                |
//!       +------------ cursor ------------+
//! ```
//!
//! Pages are never prefetched; each continuation needs the cursor decoded
//! from the page before it. Output flows to the consumer through a bounded
//! channel, so a slow reader slows the loop down instead of growing memory.

pub mod decode;
pub mod encode;
pub mod fetch;
pub mod orchestrator;
pub mod project;
pub mod query;
pub mod sink;
pub mod tokens;

pub use decode::{PageDecoder, PageSummary, RowSink};
pub use encode::{RecordEncoder, Transcoder};
pub use fetch::{PageStream, SearchEndpoint};
pub use orchestrator::{ExportStream, Exporter};
pub use project::{FieldPath, Projection};
pub use query::QueryBuilder;
pub use sink::CompressionSink;
