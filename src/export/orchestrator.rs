//! The export loop
//!
//! [`Exporter::start`] spawns one task per export. The task fetches pages one
//! at a time, decodes each page as it streams in and pushes compressed output
//! through a bounded channel to the consumer. The consumer gets an
//! [`ExportStream`] once the head of the response is settled: the total match
//! count is known, the first page is done, or output has to start flowing.
//! Anything that fails before that point is returned from `start` instead.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::export::decode::{PageDecoder, RowSink};
use crate::export::encode::Transcoder;
use crate::export::fetch::SearchEndpoint;
use crate::export::project::Projection;
use crate::export::query::QueryBuilder;
use crate::export::tokens::TokenReader;
use crate::types::{ExportRequest, ExportSummary};

/// Runs exports against one search endpoint
#[derive(Clone)]
pub struct Exporter {
    endpoint: Arc<dyn SearchEndpoint>,
    settings: ExportConfig,
}

impl Exporter {
    /// Create an exporter fetching pages from `endpoint`
    pub fn new(endpoint: Arc<dyn SearchEndpoint>, settings: ExportConfig) -> Self {
        Self { endpoint, settings }
    }

    /// Validate `request`, start exporting and wait for the response head
    ///
    /// Returns an error without producing output if the request is invalid
    /// or the export fails before its head is settled. Dropping the returned
    /// stream (or this future) cancels the export.
    pub async fn start(&self, request: ExportRequest) -> Result<ExportStream> {
        request.validate()?;

        let projection = Projection::new(
            &self.settings.timestamp_field,
            &self.settings.message_field,
            &request.columns,
        );
        let transcoder = Transcoder::new(projection, self.settings.delimiter)?;

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let (head_tx, head_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let run = ExportRun {
            endpoint: Arc::clone(&self.endpoint),
            queries: QueryBuilder::new(&self.settings.timestamp_field, self.settings.page_size),
            decoder: PageDecoder::new(self.settings.page_size),
            settings: self.settings.clone(),
            request,
            cancel,
        };
        tokio::spawn(run.execute(
            transcoder,
            Conduit {
                tx,
                head: Some(head_tx),
                total: None,
            },
        ));

        match head_rx.await {
            Ok(Ok(total)) => Ok(ExportStream {
                total,
                body: ReceiverStream::new(rx),
                _cancel: guard,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::ApiServerError(
                "export task ended without reporting a result".to_string(),
            )),
        }
    }
}

/// Compressed output of one running export
///
/// Yields gzip chunks in order; the concatenation is one complete archive.
pub struct ExportStream {
    total: Option<u64>,
    body: ReceiverStream<Bytes>,
    _cancel: DropGuard,
}

impl ExportStream {
    /// Total match count, if the service reported it before output started
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl Stream for ExportStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        Pin::new(&mut self.body).poll_next(cx)
    }
}

/// Output side of the export task: the byte channel plus the one-shot head
struct Conduit {
    tx: mpsc::Sender<Bytes>,
    head: Option<oneshot::Sender<Result<Option<u64>>>>,
    total: Option<u64>,
}

impl Conduit {
    /// Settle the head successfully; later calls do nothing
    fn open(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(Ok(self.total));
        }
    }

    async fn send(&mut self, chunk: Bytes) -> Result<()> {
        self.open();
        self.tx.send(chunk).await.map_err(|_| {
            Error::Encode(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output consumer disconnected",
            ))
        })
    }

    /// Report `err` through the head if it is still pending, otherwise hand it back
    fn fail(&mut self, err: Error) -> Option<Error> {
        match self.head.take() {
            Some(head) => {
                let _ = head.send(Err(err));
                None
            }
            None => Some(err),
        }
    }
}

/// Row sink feeding decoded rows through the transcoder into the conduit
struct Pipeline<'a> {
    transcoder: &'a mut Transcoder,
    conduit: &'a mut Conduit,
    window: &'a mut Option<String>,
    chunk_size: usize,
}

#[async_trait]
impl RowSink for Pipeline<'_> {
    fn cursor(&mut self, cursor: &str) {
        *self.window = Some(cursor.to_string());
    }

    async fn total(&mut self, total: u64) -> Result<()> {
        if self.conduit.total.is_none() {
            self.conduit.total = Some(total);
        }
        self.conduit.open();
        Ok(())
    }

    async fn row(&mut self, source: &[u8]) -> Result<()> {
        self.transcoder.write_row(source)?;
        if let Some(chunk) = self.transcoder.take_ready(self.chunk_size) {
            self.conduit.send(chunk).await?;
        }
        Ok(())
    }
}

/// Everything one export task owns
struct ExportRun {
    endpoint: Arc<dyn SearchEndpoint>,
    queries: QueryBuilder,
    decoder: PageDecoder,
    settings: ExportConfig,
    request: ExportRequest,
    cancel: CancellationToken,
}

impl ExportRun {
    async fn execute(self, mut transcoder: Transcoder, mut conduit: Conduit) {
        let mut summary = ExportSummary::default();
        let mut window = None;

        let outcome = self
            .paginate(&mut transcoder, &mut conduit, &mut summary, &mut window)
            .await;

        if let Some(cursor) = window.filter(|_| self.settings.release_window) {
            self.release(&cursor).await;
        }

        summary.rows = transcoder.rows();
        summary.total = conduit.total;
        self.finalize(outcome, transcoder, conduit, summary).await;
    }

    /// Fetch and decode pages until the cursor runs out
    ///
    /// `window` tracks the last cursor the service handed out, so the result
    /// window can be released however the loop ends.
    async fn paginate(
        &self,
        transcoder: &mut Transcoder,
        conduit: &mut Conduit,
        summary: &mut ExportSummary,
        window: &mut Option<String>,
    ) -> Result<()> {
        let scroll_window = self.settings.scroll_window;
        let mut body = self.queries.initial(&self.request)?;
        let mut continuation = false;

        loop {
            let page_no = summary.pages + 1;
            let fetch = if continuation {
                self.endpoint.continue_scroll(body, scroll_window)
            } else {
                self.endpoint.search(body, scroll_window)
            };
            let stream = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = fetch => result?,
            };

            let mut tokens = TokenReader::new(stream, format!("page {page_no}"));
            let mut pipeline = Pipeline {
                transcoder: &mut *transcoder,
                conduit: &mut *conduit,
                window: &mut *window,
                chunk_size: self.settings.chunk_size,
            };
            let page = tokio::select! {
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                result = self.decoder.decode(&mut tokens, &mut pipeline) => result,
            }?;

            summary.pages = page_no;
            conduit.open();

            tracing::debug!(
                page = page_no,
                rows = page.rows,
                total = ?page.total,
                cursor_present = page.cursor.is_some(),
                "page exported"
            );

            let Some(cursor) = page.cursor else {
                return Ok(());
            };
            body = self.queries.continuation(&cursor, scroll_window)?;
            continuation = true;
        }
    }

    async fn release(&self, cursor: &str) {
        match self.endpoint.release(cursor).await {
            Ok(()) => tracing::debug!("result window released"),
            Err(e) => tracing::warn!(error = %e, "failed to release result window"),
        }
    }

    /// Close the output exactly once, whatever the outcome
    async fn finalize(
        &self,
        outcome: Result<()>,
        transcoder: Transcoder,
        mut conduit: Conduit,
        summary: ExportSummary,
    ) {
        let result = if outcome.is_ok() { "ok" } else { "failed" };
        metrics::counter!("csv_exports_total", "outcome" => result).increment(1);
        metrics::counter!("csv_export_rows_total").increment(summary.rows);
        metrics::counter!("csv_export_pages_total").increment(summary.pages as u64);

        match outcome {
            Ok(()) => tracing::info!(
                pages = summary.pages,
                rows = summary.rows,
                total = ?summary.total,
                "export finished"
            ),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    pages = summary.pages,
                    rows = summary.rows,
                    total = ?summary.total,
                    "export failed"
                );
                if let Some(err) = conduit.fail(err) {
                    tracing::debug!(error = %err, "output already started, closing it truncated");
                } else {
                    return;
                }
            }
        }

        match transcoder.finish() {
            Ok(tail) => {
                if conduit.send(tail).await.is_err() {
                    tracing::debug!("consumer went away before the end of the output");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to close compressed output"),
        }
    }
}
