//! Incremental JSON tokenizer
//!
//! [`Lexer`] is a push-style tokenizer: bytes are fed in arbitrary chunks and
//! tokens are pulled out one at a time. When a token straddles a chunk
//! boundary the lexer reports [`Lexed::NeedMore`] without consuming anything,
//! so the caller can feed the next chunk and retry. Memory use is bounded by
//! the largest single token plus the container nesting depth.
//!
//! Two readers sit on top of it:
//! - [`TokenReader`] pulls chunks from an async byte stream (a response body).
//! - [`SliceTokens`] walks a complete in-memory value (a captured row payload).

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{Error, Result, SyntaxError};

/// One lexical unit of a JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `{`
    ObjectStart,
    /// `}`
    ObjectEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// An object member name (the `:` is consumed with it)
    Name(String),
    /// A string value
    String(String),
    /// A number value, kept as its source text
    Number(String),
    /// `true` or `false`
    Bool(bool),
    /// `null`
    Null,
}

impl Token {
    /// Whether this token opens a container
    pub fn opens(&self) -> bool {
        matches!(self, Token::ObjectStart | Token::ArrayStart)
    }

    /// Whether this token closes a container
    pub fn closes(&self) -> bool {
        matches!(self, Token::ObjectEnd | Token::ArrayEnd)
    }

    /// Short human-readable description used in shape errors
    pub fn describe(&self) -> String {
        match self {
            Token::ObjectStart => "object".to_string(),
            Token::ObjectEnd => "'}'".to_string(),
            Token::ArrayStart => "array".to_string(),
            Token::ArrayEnd => "']'".to_string(),
            Token::Name(name) => format!("field {name:?}"),
            Token::String(_) => "string".to_string(),
            Token::Number(n) => format!("number {n}"),
            Token::Bool(b) => format!("{b}"),
            Token::Null => "null".to_string(),
        }
    }
}

/// Outcome of one [`Lexer::next_token`] call
#[derive(Debug, PartialEq, Eq)]
pub enum Lexed {
    /// A complete token
    Token(Token),
    /// The buffered input ends inside a token; feed more and retry
    NeedMore,
    /// The top-level value is complete and the input is exhausted
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    FirstValueOrEnd,
    FirstNameOrEnd,
    Name,
    CommaOrEnd,
    Done,
}

enum Scan<T> {
    Complete(T),
    NeedMore,
}

/// Progress through a string that ran past the end of the buffer
#[derive(Debug, Clone, Copy)]
struct PendingString {
    /// Absolute offset of the opening quote
    quote: u64,
    /// Absolute offset scanning resumes from
    resume: u64,
    escaped: bool,
}

/// Push-style JSON tokenizer
#[derive(Debug)]
pub struct Lexer {
    buf: Vec<u8>,
    pos: usize,
    /// Absolute offset of `buf[0]` within the whole input
    consumed: u64,
    eof: bool,
    expect: Expect,
    stack: Vec<Container>,
    capture: Option<Vec<u8>>,
    pending: Option<PendingString>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    /// Create a lexer expecting a single top-level value
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            consumed: 0,
            eof: false,
            expect: Expect::Value,
            stack: Vec::new(),
            capture: None,
            pending: None,
        }
    }

    /// Append a chunk of input, discarding bytes already tokenized
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.consumed += self.pos as u64;
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Mark the input as complete
    pub fn finish(&mut self) {
        self.eof = true;
    }

    /// Number of containers currently open
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Absolute offset of the next unconsumed byte
    pub fn offset(&self) -> u64 {
        self.consumed + self.pos as u64
    }

    /// Start recording the source text of every token consumed from now on
    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stop recording and return the captured text, trimmed of surrounding whitespace
    pub fn end_capture(&mut self) -> Vec<u8> {
        let mut raw = self.capture.take().unwrap_or_default();
        let leading = raw.iter().take_while(|b| b.is_ascii_whitespace()).count();
        raw.drain(..leading);
        while raw.last().is_some_and(|b| b.is_ascii_whitespace()) {
            raw.pop();
        }
        raw
    }

    /// Produce the next token, or report that more input is needed
    ///
    /// A call that returns `NeedMore` consumes nothing; a string cut by the
    /// buffer end resumes scanning where it stopped.
    pub fn next_token(&mut self) -> std::result::Result<Lexed, SyntaxError> {
        let start = self.pos;
        let mut p = self.pos;
        let mut expect = self.expect;

        loop {
            p = skip_whitespace(&self.buf, p);
            let Some(&b) = self.buf.get(p) else {
                if !self.eof {
                    return Ok(Lexed::NeedMore);
                }
                if expect == Expect::Done {
                    self.pos = p;
                    return Ok(Lexed::Finished);
                }
                return Err(SyntaxError::UnexpectedEof {
                    offset: self.absolute(p),
                });
            };

            match expect {
                Expect::Done => {
                    return Err(self.unexpected(p, b, "end of input"));
                }
                Expect::CommaOrEnd => {
                    let top = self.stack.last().copied();
                    match (b, top) {
                        (b',', Some(Container::Object)) => {
                            p += 1;
                            expect = Expect::Name;
                        }
                        (b',', Some(Container::Array)) => {
                            p += 1;
                            expect = Expect::Value;
                        }
                        (b'}', Some(Container::Object)) | (b']', Some(Container::Array)) => {
                            return Ok(self.close(start, p + 1));
                        }
                        (_, Some(Container::Object)) => {
                            return Err(self.unexpected(p, b, "',' or '}'"));
                        }
                        _ => return Err(self.unexpected(p, b, "',' or ']'")),
                    }
                }
                Expect::FirstNameOrEnd if b == b'}' => return Ok(self.close(start, p + 1)),
                Expect::FirstValueOrEnd if b == b']' => return Ok(self.close(start, p + 1)),
                Expect::FirstNameOrEnd | Expect::Name => return self.lex_name(start, p),
                Expect::FirstValueOrEnd | Expect::Value => return self.lex_value(start, p),
            }
        }
    }

    fn lex_name(&mut self, start: usize, p: usize) -> std::result::Result<Lexed, SyntaxError> {
        let b = self.buf[p];
        if b != b'"' {
            return Err(self.unexpected(p, b, "field name"));
        }
        let (name, end) = match self.scan_string(p)? {
            Scan::Complete(found) => found,
            Scan::NeedMore => return Ok(Lexed::NeedMore),
        };

        let colon = skip_whitespace(&self.buf, end);
        match self.buf.get(colon) {
            Some(b':') => {}
            Some(&other) => return Err(self.unexpected(colon, other, "':'")),
            None if self.eof => {
                return Err(SyntaxError::UnexpectedEof {
                    offset: self.absolute(colon),
                });
            }
            None => return Ok(Lexed::NeedMore),
        }

        self.commit(start, colon + 1, Expect::Value);
        Ok(Lexed::Token(Token::Name(name)))
    }

    fn lex_value(&mut self, start: usize, p: usize) -> std::result::Result<Lexed, SyntaxError> {
        let b = self.buf[p];
        let (token, end) = match b {
            b'{' => {
                self.stack.push(Container::Object);
                self.commit(start, p + 1, Expect::FirstNameOrEnd);
                return Ok(Lexed::Token(Token::ObjectStart));
            }
            b'[' => {
                self.stack.push(Container::Array);
                self.commit(start, p + 1, Expect::FirstValueOrEnd);
                return Ok(Lexed::Token(Token::ArrayStart));
            }
            b'"' => match self.scan_string(p)? {
                Scan::Complete((s, end)) => (Token::String(s), end),
                Scan::NeedMore => return Ok(Lexed::NeedMore),
            },
            b'-' | b'0'..=b'9' => match self.scan_number(p)? {
                Scan::Complete(found) => found,
                Scan::NeedMore => return Ok(Lexed::NeedMore),
            },
            b't' => match self.scan_literal(p, b"true")? {
                Scan::Complete(end) => (Token::Bool(true), end),
                Scan::NeedMore => return Ok(Lexed::NeedMore),
            },
            b'f' => match self.scan_literal(p, b"false")? {
                Scan::Complete(end) => (Token::Bool(false), end),
                Scan::NeedMore => return Ok(Lexed::NeedMore),
            },
            b'n' => match self.scan_literal(p, b"null")? {
                Scan::Complete(end) => (Token::Null, end),
                Scan::NeedMore => return Ok(Lexed::NeedMore),
            },
            other => return Err(self.unexpected(p, other, "value")),
        };

        let next = self.after_value();
        self.commit(start, end, next);
        Ok(Lexed::Token(token))
    }

    fn close(&mut self, start: usize, end: usize) -> Lexed {
        let token = match self.stack.pop() {
            Some(Container::Object) => Token::ObjectEnd,
            _ => Token::ArrayEnd,
        };
        let next = self.after_value();
        self.commit(start, end, next);
        Lexed::Token(token)
    }

    fn after_value(&self) -> Expect {
        if self.stack.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        }
    }

    fn commit(&mut self, start: usize, end: usize, expect: Expect) {
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(&self.buf[start..end]);
        }
        self.pos = end;
        self.expect = expect;
    }

    /// Scan a string starting at the opening quote; returns the decoded text
    /// and the offset just past the closing quote.
    fn scan_string(&mut self, p: usize) -> std::result::Result<Scan<(String, usize)>, SyntaxError> {
        let quote = self.absolute(p);
        let (mut i, mut escaped) = match self.pending.take() {
            Some(pending) if pending.quote == quote => {
                ((pending.resume - self.consumed) as usize, pending.escaped)
            }
            _ => (p + 1, false),
        };
        loop {
            let Some(&b) = self.buf.get(i) else {
                let scan = self.incomplete(i)?;
                self.pending = Some(PendingString {
                    quote,
                    resume: self.absolute(i),
                    escaped,
                });
                return Ok(scan);
            };
            match b {
                b'"' => break,
                b'\\' => {
                    escaped = true;
                    i += 2;
                }
                0x00..=0x1f => {
                    return Err(SyntaxError::Invalid {
                        offset: self.absolute(i),
                        what: "control character in string",
                    });
                }
                _ => i += 1,
            }
        }

        let raw = &self.buf[p + 1..i];
        let text = if escaped {
            unescape(raw).ok_or(SyntaxError::Invalid {
                offset: self.absolute(p),
                what: "string escape",
            })?
        } else {
            String::from_utf8(raw.to_vec()).map_err(|_| SyntaxError::Invalid {
                offset: self.absolute(p),
                what: "utf-8 in string",
            })?
        };
        Ok(Scan::Complete((text, i + 1)))
    }

    fn scan_number(&self, p: usize) -> std::result::Result<Scan<(Token, usize)>, SyntaxError> {
        let mut i = p;
        while let Some(&b) = self.buf.get(i) {
            if !matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
                break;
            }
            i += 1;
        }
        if i == self.buf.len() && !self.eof {
            return Ok(Scan::NeedMore);
        }

        let text = &self.buf[p..i];
        if !is_json_number(text) {
            return Err(SyntaxError::Invalid {
                offset: self.absolute(p),
                what: "number",
            });
        }
        // Digits, signs, dots and exponents are all ASCII.
        let text = String::from_utf8_lossy(text).into_owned();
        Ok(Scan::Complete((Token::Number(text), i)))
    }

    fn scan_literal(
        &self,
        p: usize,
        literal: &'static [u8],
    ) -> std::result::Result<Scan<usize>, SyntaxError> {
        let available = &self.buf[p..];
        let n = available.len().min(literal.len());
        if available[..n] != literal[..n] {
            return Err(SyntaxError::Invalid {
                offset: self.absolute(p),
                what: "literal",
            });
        }
        if n < literal.len() {
            return self.incomplete(p + n);
        }
        Ok(Scan::Complete(p + literal.len()))
    }

    fn incomplete<T>(&self, at: usize) -> std::result::Result<Scan<T>, SyntaxError> {
        if self.eof {
            Err(SyntaxError::UnexpectedEof {
                offset: self.absolute(at.min(self.buf.len())),
            })
        } else {
            Ok(Scan::NeedMore)
        }
    }

    fn unexpected(&self, p: usize, b: u8, expected: &'static str) -> SyntaxError {
        SyntaxError::Unexpected {
            offset: self.absolute(p),
            found: char::from(b),
            expected,
        }
    }

    fn absolute(&self, p: usize) -> u64 {
        self.consumed + p as u64
    }
}

fn skip_whitespace(buf: &[u8], mut p: usize) -> usize {
    while let Some(b' ' | b'\t' | b'\n' | b'\r') = buf.get(p) {
        p += 1;
    }
    p
}

fn is_json_number(text: &[u8]) -> bool {
    let mut i = 0;
    if text.first() == Some(&b'-') {
        i += 1;
    }
    match text.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => {
            while let Some(b'0'..=b'9') = text.get(i) {
                i += 1;
            }
        }
        _ => return false,
    }
    if text.get(i) == Some(&b'.') {
        i += 1;
        let digits = i;
        while let Some(b'0'..=b'9') = text.get(i) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    if let Some(b'e' | b'E') = text.get(i) {
        i += 1;
        if let Some(b'+' | b'-') = text.get(i) {
            i += 1;
        }
        let digits = i;
        while let Some(b'0'..=b'9') = text.get(i) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    i == text.len()
}

/// Decode string escapes. Unpaired surrogates become U+FFFD.
fn unescape(raw: &[u8]) -> Option<String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let kind = *raw.get(i + 1)?;
        i += 2;
        let simple = match kind {
            b'"' => b'"',
            b'\\' => b'\\',
            b'/' => b'/',
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'u' => {
                let unit = hex4(raw.get(i..i + 4)?)?;
                i += 4;
                let c = match unit {
                    0xD800..=0xDBFF => match low_surrogate(&raw[i..]) {
                        Some(low) => {
                            i += 6;
                            char::from_u32(0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00))
                                .unwrap_or(char::REPLACEMENT_CHARACTER)
                        }
                        None => char::REPLACEMENT_CHARACTER,
                    },
                    _ => char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER),
                };
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                continue;
            }
            _ => return None,
        };
        out.push(simple);
    }
    String::from_utf8(out).ok()
}

/// A `\uDC00`..`\uDFFF` escape at the start of `rest`
fn low_surrogate(rest: &[u8]) -> Option<u32> {
    if rest.get(..2)? != b"\\u" {
        return None;
    }
    hex4(rest.get(2..6)?).filter(|low| (0xDC00..=0xDFFF).contains(low))
}

fn hex4(digits: &[u8]) -> Option<u32> {
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, 16).ok()
}

/// Depth counter implementing the structural skip
///
/// Feed it the tokens of one value in order; it reports completion once the
/// value is fully consumed. A scalar completes immediately, a container
/// completes when its matching close token arrives.
#[derive(Debug, Default)]
pub struct SkipDepth {
    depth: usize,
}

impl SkipDepth {
    /// Account for one token. Returns `Ok(true)` when the value is complete.
    pub fn step(&mut self, token: &Token) -> std::result::Result<bool, SyntaxError> {
        if token.opens() {
            self.depth += 1;
        } else if token.closes() {
            self.depth = self.depth.checked_sub(1).ok_or_else(|| SyntaxError::Shape {
                field: "value",
                found: token.describe(),
            })?;
        }
        Ok(self.depth == 0)
    }
}

/// Async token reader over a chunked byte stream
pub struct TokenReader<S> {
    lexer: Lexer,
    source: S,
    context: String,
}

impl<S> TokenReader<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Wrap a byte stream; `context` labels decode errors (e.g. "page 2")
    pub fn new(source: S, context: impl Into<String>) -> Self {
        Self {
            lexer: Lexer::new(),
            source,
            context: context.into(),
        }
    }

    /// Next token, or `None` once the top-level value is complete
    pub async fn next(&mut self) -> Result<Option<Token>> {
        loop {
            match self.lexer.next_token() {
                Ok(Lexed::Token(token)) => return Ok(Some(token)),
                Ok(Lexed::Finished) => return Ok(None),
                Ok(Lexed::NeedMore) => match self.source.next().await {
                    Some(chunk) => self.lexer.feed(&chunk?),
                    None => self.lexer.finish(),
                },
                Err(source) => return Err(self.decode_error(source)),
            }
        }
    }

    /// Next token; running out of input is an error
    pub async fn expect_token(&mut self) -> Result<Token> {
        match self.next().await? {
            Some(token) => Ok(token),
            None => Err(self.decode_error(SyntaxError::UnexpectedEof {
                offset: self.lexer.offset(),
            })),
        }
    }

    /// Consume and discard exactly one value
    pub async fn skip_value(&mut self) -> Result<()> {
        let first = self.expect_token().await?;
        self.skip_rest(first).await
    }

    /// Finish skipping a value whose first token was already read
    pub async fn skip_rest(&mut self, first: Token) -> Result<()> {
        let mut skip = SkipDepth::default();
        let mut token = first;
        while !skip.step(&token).map_err(|e| self.decode_error(e))? {
            token = self.expect_token().await?;
        }
        Ok(())
    }

    /// Consume exactly one value and return its source text
    pub async fn capture_value(&mut self) -> Result<Vec<u8>> {
        self.lexer.begin_capture();
        let skipped = self.skip_value().await;
        let raw = self.lexer.end_capture();
        skipped.map(|_| raw)
    }

    /// Number of containers currently open
    pub fn depth(&self) -> usize {
        self.lexer.depth()
    }

    /// Build a shape error for a token that does not fit `field`
    pub fn shape_error(&self, field: &'static str, found: &Token) -> Error {
        self.decode_error(SyntaxError::Shape {
            field,
            found: found.describe(),
        })
    }

    fn decode_error(&self, source: SyntaxError) -> Error {
        Error::Decode {
            context: self.context.clone(),
            source,
        }
    }
}

/// Synchronous token reader over one complete value held in memory
pub struct SliceTokens {
    lexer: Lexer,
}

impl SliceTokens {
    /// Tokenize `raw`, which must hold exactly one JSON value
    pub fn new(raw: &[u8]) -> Self {
        let mut lexer = Lexer::new();
        lexer.feed(raw);
        lexer.finish();
        Self { lexer }
    }

    /// Next token, or `None` once the value is complete
    pub fn next(&mut self) -> Result<Option<Token>> {
        match self.lexer.next_token() {
            Ok(Lexed::Token(token)) => Ok(Some(token)),
            Ok(Lexed::Finished) => Ok(None),
            // Unreachable once finish() has been called, but keep it total.
            Ok(Lexed::NeedMore) => Err(Self::decode_error(SyntaxError::UnexpectedEof {
                offset: self.lexer.offset(),
            })),
            Err(source) => Err(Self::decode_error(source)),
        }
    }

    /// Next token; running out of input is an error
    pub fn expect_token(&mut self) -> Result<Token> {
        self.next()?.ok_or_else(|| {
            Self::decode_error(SyntaxError::UnexpectedEof {
                offset: self.lexer.offset(),
            })
        })
    }

    /// Consume and discard exactly one value
    pub fn skip_value(&mut self) -> Result<()> {
        let first = self.expect_token()?;
        self.skip_rest(first)
    }

    /// Finish skipping a value whose first token was already read
    pub fn skip_rest(&mut self, first: Token) -> Result<()> {
        let mut skip = SkipDepth::default();
        let mut token = first;
        while !skip.step(&token).map_err(Self::decode_error)? {
            token = self.expect_token()?;
        }
        Ok(())
    }

    /// Number of containers currently open
    pub fn depth(&self) -> usize {
        self.lexer.depth()
    }

    fn decode_error(source: SyntaxError) -> Error {
        Error::Decode {
            context: "row payload".to_string(),
            source,
        }
    }
}
