//! Incremental decoding of one search response page
//!
//! [`PageDecoder`] walks the token stream of a search or scroll response and
//! pulls out three things: the continuation cursor, the total match count and
//! the `_source` payload of every hit. Each payload is forwarded to a
//! [`RowSink`] as soon as its hit object closes; nothing else in the response
//! is materialized. Fields the decoder does not know are skipped structurally,
//! so extra response metadata costs nothing but the tokenizing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tracing::trace;

use crate::error::Result;
use crate::export::tokens::{Token, TokenReader};

/// Payload forwarded for a hit that carries no `_source`
const EMPTY_SOURCE: &[u8] = b"{}";

/// Receives decoded data as the page is read
#[async_trait]
pub trait RowSink: Send {
    /// Called as soon as the response hands out a non-empty cursor
    fn cursor(&mut self, _cursor: &str) {}

    /// Called once per page that reports a total match count
    async fn total(&mut self, _total: u64) -> Result<()> {
        Ok(())
    }

    /// Called once per hit with the raw source text of its `_source` value
    async fn row(&mut self, source: &[u8]) -> Result<()>;
}

/// What one page told us
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageSummary {
    /// Cursor for the next continuation call; `None` ends the export
    pub cursor: Option<String>,
    /// Cursor exactly as the response supplied it, before the short-page rule
    pub issued_cursor: Option<String>,
    /// Total match count, if the response reported one
    pub total: Option<u64>,
    /// Number of hits on this page
    pub rows: usize,
}

/// Decoder for search and scroll responses
///
/// The page size limit is fixed at construction: a page with fewer hits than
/// the limit ends the export even if the response handed out a cursor.
#[derive(Clone, Copy, Debug)]
pub struct PageDecoder {
    page_size: usize,
}

impl PageDecoder {
    /// Create a decoder for pages requested with `page_size` rows
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Decode one complete response, forwarding rows to `sink` as they close
    pub async fn decode<S, R>(&self, tokens: &mut TokenReader<S>, sink: &mut R) -> Result<PageSummary>
    where
        S: Stream<Item = Result<Bytes>> + Unpin + Send,
        R: RowSink + ?Sized,
    {
        let mut page = PageSummary::default();

        let open = tokens.expect_token().await?;
        if open != Token::ObjectStart {
            return Err(tokens.shape_error("response", &open));
        }

        loop {
            match tokens.expect_token().await? {
                Token::ObjectEnd => break,
                Token::Name(name) => match name.as_str() {
                    "_scroll_id" => match tokens.expect_token().await? {
                        Token::String(id) if !id.is_empty() => {
                            sink.cursor(&id);
                            page.issued_cursor = Some(id);
                        }
                        Token::String(_) => page.issued_cursor = None,
                        other => tokens.skip_rest(other).await?,
                    },
                    "hits" => decode_hits(tokens, sink, &mut page).await?,
                    _ => tokens.skip_value().await?,
                },
                other => return Err(tokens.shape_error("response", &other)),
            }
        }
        // Anything after the closing brace other than whitespace is an error.
        tokens.next().await?;

        page.cursor = if page.rows < self.page_size {
            None
        } else {
            page.issued_cursor.clone()
        };
        trace!(
            rows = page.rows,
            total = ?page.total,
            cursor_present = page.cursor.is_some(),
            "page decoded"
        );
        Ok(page)
    }
}

async fn decode_hits<S, R>(
    tokens: &mut TokenReader<S>,
    sink: &mut R,
    page: &mut PageSummary,
) -> Result<()>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
    R: RowSink + ?Sized,
{
    let open = tokens.expect_token().await?;
    if open != Token::ObjectStart {
        return Err(tokens.shape_error("hits", &open));
    }

    loop {
        match tokens.expect_token().await? {
            Token::ObjectEnd => return Ok(()),
            Token::Name(name) => match name.as_str() {
                "hits" => decode_rows(tokens, sink, page).await?,
                "total" => {
                    if let Some(total) = decode_total(tokens).await? {
                        page.total = Some(total);
                        sink.total(total).await?;
                    }
                }
                _ => tokens.skip_value().await?,
            },
            other => return Err(tokens.shape_error("hits", &other)),
        }
    }
}

async fn decode_rows<S, R>(
    tokens: &mut TokenReader<S>,
    sink: &mut R,
    page: &mut PageSummary,
) -> Result<()>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
    R: RowSink + ?Sized,
{
    let open = tokens.expect_token().await?;
    if open != Token::ArrayStart {
        return Err(tokens.shape_error("hits.hits", &open));
    }

    loop {
        match tokens.expect_token().await? {
            Token::ArrayEnd => return Ok(()),
            Token::ObjectStart => {
                let source = decode_hit(tokens).await?;
                page.rows += 1;
                sink.row(source.as_deref().unwrap_or(EMPTY_SOURCE)).await?;
            }
            other => return Err(tokens.shape_error("hits.hits", &other)),
        }
    }
}

/// Read one hit object (opening brace already consumed) and return its `_source` text
async fn decode_hit<S>(tokens: &mut TokenReader<S>) -> Result<Option<Vec<u8>>>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
{
    let mut source = None;
    loop {
        match tokens.expect_token().await? {
            Token::ObjectEnd => return Ok(source),
            Token::Name(name) if name == "_source" => {
                source = Some(tokens.capture_value().await?);
            }
            Token::Name(_) => tokens.skip_value().await?,
            other => return Err(tokens.shape_error("hit", &other)),
        }
    }
}

/// `hits.total` is `{"value": n, ...}` on current servers and a bare number on old ones
async fn decode_total<S>(tokens: &mut TokenReader<S>) -> Result<Option<u64>>
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
{
    match tokens.expect_token().await? {
        Token::Number(n) => parse_total(tokens, n).map(Some),
        Token::Null => Ok(None),
        Token::ObjectStart => {
            let mut total = None;
            loop {
                match tokens.expect_token().await? {
                    Token::ObjectEnd => return Ok(total),
                    Token::Name(name) if name == "value" => match tokens.expect_token().await? {
                        Token::Number(n) => total = Some(parse_total(tokens, n)?),
                        other => return Err(tokens.shape_error("hits.total.value", &other)),
                    },
                    Token::Name(_) => tokens.skip_value().await?,
                    other => return Err(tokens.shape_error("hits.total", &other)),
                }
            }
        }
        other => Err(tokens.shape_error("hits.total", &other)),
    }
}

fn parse_total<S>(tokens: &TokenReader<S>, n: String) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    n.parse()
        .map_err(|_| tokens.shape_error("hits.total", &Token::Number(n)))
}
