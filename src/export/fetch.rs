//! Abstract paging endpoint consumed by the export engine
//!
//! The engine never talks HTTP directly; it drives a [`SearchEndpoint`].
//! [`crate::client::OpenSearchClient`] is the production implementation,
//! tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// A response body, delivered as raw chunks in arrival order
///
/// A chunk error (connection reset mid-body) is a transport failure.
pub type PageStream = BoxStream<'static, Result<Bytes>>;

/// A remote service that hands out a large result set one window at a time
///
/// Both paging calls resolve once the response status is known. An error
/// status is reported as `Err` here; only a successful response yields a
/// [`PageStream`], which the caller decodes incrementally.
#[async_trait]
pub trait SearchEndpoint: Send + Sync {
    /// Open a result window and fetch its first page
    ///
    /// `body` is the serialized query built by
    /// [`crate::export::query::QueryBuilder::initial`]; the page size limit
    /// travels inside it. `window` is how long the service keeps the result
    /// window alive.
    async fn search(&self, body: Vec<u8>, window: Duration) -> Result<PageStream>;

    /// Fetch the next page of an open result window
    async fn continue_scroll(&self, body: Vec<u8>, window: Duration) -> Result<PageStream>;

    /// Free the server-side result window identified by `cursor`
    async fn release(&self, cursor: &str) -> Result<()>;
}
