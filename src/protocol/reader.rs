//! Exact Reader
//!
//! Reads exact byte counts from the stream into a reusable scratch buffer and
//! keeps the cumulative offset used for event alignment.

use std::io::{self, Read};

use bytes::BytesMut;

use crate::config::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::error::{LoaderError, Result};

/// Reads exact byte counts from a stream
pub struct ExactReader<R> {
    /// Underlying byte source
    inner: R,

    /// Scratch buffer, grows but never shrinks
    scratch: BytesMut,

    /// Bytes consumed since stream start
    consumed: u64,

    /// Largest single read accepted into the scratch buffer
    max_read: u32,
}

impl<R: Read> ExactReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a reader that refuses single reads above `max_read` bytes
    pub fn with_limit(inner: R, max_read: u32) -> Self {
        Self {
            inner,
            scratch: BytesMut::new(),
            consumed: 0,
            max_read,
        }
    }

    /// Bytes consumed since stream start
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Restart offset accounting, e.g. for a new stream on the same source
    pub fn reset_offset(&mut self) {
        self.consumed = 0;
    }

    /// Current scratch buffer size
    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Read exactly `len` bytes into the scratch buffer
    ///
    /// The returned slice is valid until the next read.
    pub fn read_exact(&mut self, len: u64) -> Result<&[u8]> {
        if len > self.max_read as u64 {
            return Err(LoaderError::PayloadTooLarge {
                size: len,
                max: self.max_read as u64,
            });
        }
        let len = len as usize;
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }

        tracing::trace!(bytes = len, offset = self.consumed, "reading");

        self.inner.read_exact(&mut self.scratch[..len])?;
        self.consumed += len as u64;
        Ok(&self.scratch[..len])
    }

    /// Read a fixed-size field without touching the scratch buffer
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.inner.read_exact(&mut bytes)?;
        self.consumed += N as u64;
        Ok(bytes)
    }

    /// Read a native-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.read_array()?))
    }

    /// Read a 4-byte length followed by that many bytes
    pub fn read_prefixed(&mut self) -> Result<&[u8]> {
        let len = self.read_u32()?;
        self.read_exact(len as u64)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_prefixed_str(&mut self, field: &'static str) -> Result<&str> {
        let bytes = self.read_prefixed()?;
        std::str::from_utf8(bytes).map_err(|_| LoaderError::InvalidText(field))
    }

    /// Discard `len` bytes without buffering them
    pub fn skip(&mut self, len: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        self.consumed += copied;
        if copied != len {
            return Err(LoaderError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended while skipping {} bytes ({} available)", len, copied),
            )));
        }
        Ok(())
    }

    /// Discard padding up to the next multiple of `boundary`
    ///
    /// Returns the number of bytes discarded.
    pub fn align(&mut self, boundary: u8) -> Result<u64> {
        let boundary = boundary as u64;
        if boundary <= 1 {
            return Ok(0);
        }
        let rem = self.consumed % boundary;
        if rem == 0 {
            return Ok(0);
        }
        let pad = boundary - rem;
        self.skip(pad)?;
        Ok(pad)
    }

    /// Give back the underlying source
    pub fn into_inner(self) -> R {
        self.inner
    }
}
