//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`export`]: Streaming CSV export
//! - [`system`]: Health and OpenAPI

mod export;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use export::*;
pub use system::*;

/// Header carrying the total match count, when known before output starts
pub const TOTAL_HITS_HEADER: &str = "total-hits";
