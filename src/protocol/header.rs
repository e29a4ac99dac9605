//! Stream header
//!
//! The fixed 24-byte header that opens every stream.
//!
//! ```text
//! ┌───────────────┬────────────┬─────────────┬──────────────┬─────────────┐
//! │ Signature (8) │ Endian (4) │ Version (4) │ Hdr Size (4) │ Packing (4) │
//! └───────────────┴────────────┴─────────────┴──────────────┴─────────────┘
//! ```

use std::io::Read;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LoaderError, Result};
use super::ExactReader;

/// Magic bytes at the start of every stream
pub const SIGNATURE: &[u8; 8] = b"NCBIgnld";

/// Endianness marker as written by a producer of the same byte order
pub const GOOD_ENDIAN: u32 = 1;

/// Endianness marker as seen when the producer used the other byte order
pub const REVERSE_ENDIAN: u32 = GOOD_ENDIAN.swap_bytes();

/// The only supported format version
pub const CURRENT_VERSION: u32 = 1;

/// Size of the fixed header fields
pub const HEADER_SIZE: usize = 24;

/// Byte order declared by the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Native,
    Reverse,
    Invalid(u32),
}

impl Endianness {
    pub fn from_marker(marker: u32) -> Self {
        match marker {
            GOOD_ENDIAN => Endianness::Native,
            REVERSE_ENDIAN => Endianness::Reverse,
            other => Endianness::Invalid(other),
        }
    }
}

/// The decoded stream header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub signature: [u8; 8],
    pub endian: u32,
    pub version: u32,
    pub header_size: u32,
    pub packing: u32,
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self {
            signature: *SIGNATURE,
            endian: GOOD_ENDIAN,
            version: CURRENT_VERSION,
            header_size: HEADER_SIZE as u32,
            packing: 0,
        }
    }
}

impl StreamHeader {
    /// Parse the fixed header fields
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoaderError::MalformedHeader(format!(
                "expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let mut buf = bytes;
        let mut signature = [0u8; 8];
        buf.copy_to_slice(&mut signature);
        Ok(Self {
            signature,
            endian: buf.get_u32_ne(),
            version: buf.get_u32_ne(),
            header_size: buf.get_u32_ne(),
            packing: buf.get_u32_ne(),
        })
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(&self.signature);
        buf.put_u32_ne(self.endian);
        buf.put_u32_ne(self.version);
        buf.put_u32_ne(self.header_size);
        buf.put_u32_ne(self.packing);
        buf
    }

    pub fn endianness(&self) -> Endianness {
        Endianness::from_marker(self.endian)
    }

    /// Check the header against what this loader supports
    ///
    /// Checks run in a fixed order and the first failure is reported.
    pub fn validate(&self) -> Result<()> {
        if &self.signature != SIGNATURE {
            return Err(LoaderError::BadSignature(
                String::from_utf8_lossy(&self.signature).into_owned(),
            ));
        }

        match self.endianness() {
            Endianness::Native => {}
            Endianness::Reverse => {
                tracing::info!("Detected reverse endianness (not supported)");
                return Err(LoaderError::ReverseEndian);
            }
            Endianness::Invalid(marker) => return Err(LoaderError::InvalidEndian(marker)),
        }

        if self.version != CURRENT_VERSION {
            return Err(LoaderError::BadVersion {
                found: self.version,
                expected: CURRENT_VERSION,
            });
        }

        if self.packing != 0 {
            tracing::info!("Detected packed format (not supported)");
            return Err(LoaderError::PackedFormat);
        }

        if (self.header_size as usize) < HEADER_SIZE {
            return Err(LoaderError::MalformedHeader(format!(
                "header size {} is below the fixed size {}",
                self.header_size, HEADER_SIZE
            )));
        }

        Ok(())
    }

    /// Bytes of header extension that follow the fixed fields
    pub fn extension_len(&self) -> u64 {
        (self.header_size as u64).saturating_sub(HEADER_SIZE as u64)
    }

    /// Read, validate and skip past the stream header
    pub fn read_from<R: Read>(reader: &mut ExactReader<R>) -> Result<Self> {
        // Fixed size, so the payload cap does not apply
        let header = Self::parse(&reader.read_array::<HEADER_SIZE>()?)?;
        header.validate()?;

        let extra = header.extension_len();
        if extra > 0 {
            tracing::debug!(bytes = extra, "skipping header extension");
            reader.skip(extra)?;
        }
        Ok(header)
    }
}
