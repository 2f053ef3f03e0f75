//! Gzip output buffer drained in chunks by the export loop

use std::io::{self, Write};
use std::mem;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

/// Streaming gzip compressor over an in-memory buffer
///
/// Compressed bytes accumulate in the buffer until [`Self::take_ready`]
/// hands them out. [`Self::finish`] consumes the sink, so the trailer is
/// written exactly once.
pub struct CompressionSink {
    gz: GzEncoder<Vec<u8>>,
}

impl Default for CompressionSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionSink {
    /// Start a gzip stream at the default compression level
    pub fn new() -> Self {
        Self {
            gz: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }

    /// Compressed bytes produced so far and not yet taken
    pub fn buffered(&self) -> usize {
        self.gz.get_ref().len()
    }

    /// Take the compressed bytes if at least `min` of them are waiting
    ///
    /// The compressor keeps its own state; only finished output is drained.
    pub fn take_ready(&mut self, min: usize) -> Option<Bytes> {
        let buffered = self.buffered();
        if buffered == 0 || buffered < min {
            return None;
        }
        Some(Bytes::from(mem::take(self.gz.get_mut())))
    }

    /// Flush the compressor, write the gzip trailer and return the remaining bytes
    pub fn finish(mut self) -> Result<Bytes> {
        self.gz.flush().map_err(Error::Encode)?;
        let rest = self.gz.finish().map_err(Error::Encode)?;
        Ok(Bytes::from(rest))
    }
}

impl Write for CompressionSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gz.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.gz.flush()
    }
}
