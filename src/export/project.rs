//! Column projection from raw row payloads
//!
//! Each configured column is a dotted field path, looked up directly in the
//! row's source text by walking its tokens. Nothing is deserialized into a
//! document tree; siblings of the path are skipped structurally.

use crate::error::{Error, Result};
use crate::export::tokens::{SkipDepth, SliceTokens, Token};

/// A dotted field path such as `container.image.name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    text: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Split `text` on dots; no segment is ever rejected
    pub fn parse(text: &str) -> Self {
        Self {
            text: text.to_string(),
            segments: text.split('.').map(str::to_string).collect(),
        }
    }

    /// The path as configured, used as the column name
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Look the path up in one raw payload and stringify the value found
    ///
    /// A missing path, or a payload that is not an object, yields an empty cell.
    pub fn lookup(&self, raw: &[u8]) -> Result<String> {
        let mut tokens = SliceTokens::new(raw);
        let first = tokens.expect_token()?;
        Ok(find(&mut tokens, first, &self.segments)?.unwrap_or_default())
    }
}

/// The ordered set of output columns for one export
///
/// The timestamp and message fields always lead, followed by the requested
/// columns in request order.
#[derive(Clone, Debug)]
pub struct Projection {
    fields: Vec<FieldPath>,
}

impl Projection {
    /// Build the column list: timestamp, message, then `columns` in order
    pub fn new(timestamp_field: &str, message_field: &str, columns: &[String]) -> Self {
        let fields = [timestamp_field, message_field]
            .into_iter()
            .chain(columns.iter().map(String::as_str))
            .map(FieldPath::parse)
            .collect();
        Self { fields }
    }

    /// Column names, in output order
    pub fn header(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.as_str().to_string()).collect()
    }

    /// Project one raw row payload into exactly [`Self::width`] cells
    pub fn project(&self, raw: &[u8]) -> Result<Vec<String>> {
        self.fields.iter().map(|field| field.lookup(raw)).collect()
    }
}

/// Search `path` inside the value starting with `first`
///
/// Returning `None` always leaves the whole value consumed, so the caller can
/// keep scanning siblings.
fn find(tokens: &mut SliceTokens, first: Token, path: &[String]) -> Result<Option<String>> {
    let Some(segment) = path.first() else {
        return render(tokens, first).map(Some);
    };

    match first {
        Token::ObjectStart => loop {
            match tokens.expect_token()? {
                Token::ObjectEnd => return Ok(None),
                Token::Name(key) => {
                    let value = tokens.expect_token()?;
                    match matched_segments(&key, path) {
                        Some(n) => {
                            if let Some(found) = find(tokens, value, &path[n..])? {
                                return Ok(Some(found));
                            }
                        }
                        None => tokens.skip_rest(value)?,
                    }
                }
                other => return Err(shape_error(&other)),
            }
        },
        Token::ArrayStart => {
            let index = segment.parse::<usize>().ok();
            let mut i = 0;
            loop {
                let element = tokens.expect_token()?;
                if element == Token::ArrayEnd {
                    return Ok(None);
                }
                if index == Some(i) {
                    if let Some(found) = find(tokens, element, &path[1..])? {
                        return Ok(Some(found));
                    }
                } else {
                    tokens.skip_rest(element)?;
                }
                i += 1;
            }
        }
        // A scalar has no children; it is already fully consumed.
        _ => Ok(None),
    }
}

/// How many leading path segments an object key covers
///
/// `"container"` covers one segment of `container.image.name`, while a
/// flattened key `"container.image.name"` covers all three.
fn matched_segments(key: &str, path: &[String]) -> Option<usize> {
    let mut n = 0;
    for part in key.split('.') {
        if path.get(n)?.as_str() != part {
            return None;
        }
        n += 1;
    }
    Some(n)
}

/// Stringify one value: strings and numbers verbatim, booleans as words,
/// null as empty and containers as compact JSON.
fn render(tokens: &mut SliceTokens, first: Token) -> Result<String> {
    match first {
        Token::String(s) => Ok(s),
        Token::Number(n) => Ok(n),
        Token::Bool(b) => Ok(b.to_string()),
        Token::Null => Ok(String::new()),
        Token::ObjectStart | Token::ArrayStart => {
            let mut out = String::new();
            write_compact(tokens, first, &mut out)?;
            Ok(out)
        }
        other => Err(shape_error(&other)),
    }
}

/// Re-emit a container as compact JSON, keeping member order
fn write_compact(tokens: &mut SliceTokens, first: Token, out: &mut String) -> Result<()> {
    let mut skip = SkipDepth::default();
    let mut token = first;
    let mut after_value = false;
    loop {
        if after_value && !token.closes() {
            out.push(',');
        }
        match &token {
            Token::ObjectStart => out.push('{'),
            Token::ObjectEnd => out.push('}'),
            Token::ArrayStart => out.push('['),
            Token::ArrayEnd => out.push(']'),
            Token::Name(name) => {
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
            }
            Token::String(s) => out.push_str(&serde_json::to_string(s)?),
            Token::Number(n) => out.push_str(n),
            Token::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Token::Null => out.push_str("null"),
        }
        after_value = !matches!(
            token,
            Token::ObjectStart | Token::ArrayStart | Token::Name(_)
        );

        let done = skip.step(&token).map_err(|source| Error::Decode {
            context: "row payload".to_string(),
            source,
        })?;
        if done {
            return Ok(());
        }
        token = tokens.expect_token()?;
    }
}

fn shape_error(found: &Token) -> Error {
    Error::Decode {
        context: "row payload".to_string(),
        source: crate::error::SyntaxError::Shape {
            field: "row",
            found: found.describe(),
        },
    }
}
