//! Delimited record encoding
//!
//! [`RecordEncoder`] writes fixed-width records separated by a configurable
//! delimiter, quoting cells the way CSV readers expect. [`Transcoder`] glues
//! projection, encoding and compression together for one export.

use std::io::{self, Write};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::export::project::Projection;
use crate::export::sink::CompressionSink;

/// Writer of fixed-width delimited records
///
/// Each record is assembled in memory and handed to the inner writer with a
/// single `write_all`, so a failure never leaves half a record behind.
pub struct RecordEncoder<W: Write> {
    inner: W,
    delimiter: char,
    width: usize,
    line: String,
}

impl<W: Write> RecordEncoder<W> {
    /// Create an encoder and write the header record
    ///
    /// Every later record must have as many cells as `header`.
    pub fn new<S: AsRef<str>>(inner: W, delimiter: char, header: &[S]) -> Result<Self> {
        let mut encoder = Self {
            inner,
            delimiter,
            width: header.len(),
            line: String::new(),
        };
        encoder.write_record(header)?;
        Ok(encoder)
    }

    /// Write one record
    pub fn write_record<S: AsRef<str>>(&mut self, cells: &[S]) -> Result<()> {
        if cells.len() != self.width {
            return Err(Error::Encode(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record has {} cells, expected {}", cells.len(), self.width),
            )));
        }

        self.line.clear();
        for (i, cell) in cells.iter().enumerate() {
            if i > 0 {
                self.line.push(self.delimiter);
            }
            push_cell(&mut self.line, cell.as_ref(), self.delimiter);
        }
        self.line.push('\n');
        self.inner
            .write_all(self.line.as_bytes())
            .map_err(Error::Encode)
    }

    /// Mutable access to the inner writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Return the inner writer; every record has already been handed to it
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn needs_quotes(cell: &str, delimiter: char) -> bool {
    cell.chars().next().is_some_and(char::is_whitespace)
        || cell.contains(|c| c == delimiter || c == '"' || c == '\r' || c == '\n')
}

fn push_cell(line: &mut String, cell: &str, delimiter: char) {
    if !needs_quotes(cell, delimiter) {
        line.push_str(cell);
        return;
    }
    line.push('"');
    for c in cell.chars() {
        if c == '"' {
            line.push('"');
        }
        line.push(c);
    }
    line.push('"');
}

/// Raw row payloads in, compressed delimited text out
pub struct Transcoder {
    projection: Projection,
    encoder: RecordEncoder<CompressionSink>,
    rows: u64,
}

impl Transcoder {
    /// Start an output stream; the header record is written immediately
    pub fn new(projection: Projection, delimiter: char) -> Result<Self> {
        let encoder = RecordEncoder::new(CompressionSink::new(), delimiter, &projection.header())?;
        Ok(Self {
            projection,
            encoder,
            rows: 0,
        })
    }

    /// Project and encode one row
    ///
    /// The payload is fully projected before anything is written, so a
    /// malformed payload produces no output.
    pub fn write_row(&mut self, raw: &[u8]) -> Result<()> {
        let cells = self.projection.project(raw)?;
        self.encoder.write_record(&cells)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written after the header
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Compressed output ready to send, once at least `min` bytes are waiting
    pub fn take_ready(&mut self, min: usize) -> Option<Bytes> {
        self.encoder.get_mut().take_ready(min)
    }

    /// Flush and close the compressor, returning all remaining output
    pub fn finish(self) -> Result<Bytes> {
        self.encoder.into_inner().finish()
    }
}
