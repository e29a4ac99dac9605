//! Stream Writer
//!
//! Producer-side encoder for the event stream. Pads between events the same
//! way the loader aligns.

use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::config::DEFAULT_ALIGNMENT;
use crate::error::{LoaderError, Result};
use super::{ColumnId, EventHeader, EventKind, StreamHeader, TableId};

/// Writes an event stream
pub struct StreamWriter<W> {
    inner: W,
    written: u64,
    alignment: u8,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_alignment(inner, DEFAULT_ALIGNMENT)
    }

    pub fn with_alignment(inner: W, alignment: u8) -> Self {
        Self {
            inner,
            written: 0,
            alignment,
        }
    }

    /// Bytes written so far, padding included
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Write the default stream header
    pub fn header(&mut self) -> Result<()> {
        self.write_header(&StreamHeader::default())
    }

    /// Write an arbitrary stream header, e.g. one with an extension
    pub fn write_header(&mut self, header: &StreamHeader) -> Result<()> {
        self.put(&header.encode())?;
        let extra = header.extension_len();
        if extra > 0 {
            self.put(&vec![0u8; extra as usize])?;
        }
        Ok(())
    }

    pub fn use_schema(&mut self, content: &str, name: &str) -> Result<()> {
        let mut payload = BytesMut::with_capacity(8 + content.len() + name.len());
        payload.put_u32_ne(len_u32(content.len())?);
        payload.put_u32_ne(len_u32(name.len())?);
        payload.put_slice(content.as_bytes());
        payload.put_slice(name.as_bytes());
        self.event(EventKind::UseSchema, 0, &payload)
    }

    pub fn remote_path(&mut self, path: &str) -> Result<()> {
        self.event(EventKind::RemotePath, 0, &prefixed(path.as_bytes())?)
    }

    pub fn new_table(&mut self, id: TableId, name: &str) -> Result<()> {
        self.event(EventKind::NewTable, id.0, &prefixed(name.as_bytes())?)
    }

    pub fn new_column(
        &mut self,
        id: ColumnId,
        table: TableId,
        elem_bits: u32,
        name: &str,
    ) -> Result<()> {
        let mut payload = BytesMut::with_capacity(12 + name.len());
        payload.put_u32_ne(table.0);
        payload.put_u32_ne(elem_bits);
        payload.put_slice(&prefixed(name.as_bytes())?);
        self.event(EventKind::NewColumn, id.0, &payload)
    }

    pub fn open_stream(&mut self) -> Result<()> {
        self.event(EventKind::OpenStream, 0, &[])
    }

    /// Write cell data; `data` must already hold `count` packed elements
    pub fn cell_data(&mut self, column: ColumnId, count: u32, data: &[u8]) -> Result<()> {
        self.cell(EventKind::CellData, column, count, data)
    }

    pub fn cell_default(&mut self, column: ColumnId, count: u32, data: &[u8]) -> Result<()> {
        self.cell(EventKind::CellDefault, column, count, data)
    }

    pub fn next_row(&mut self, table: TableId) -> Result<()> {
        self.event(EventKind::NextRow, table.0, &[])
    }

    pub fn end_stream(&mut self) -> Result<()> {
        self.event(EventKind::EndStream, 0, &[])
    }

    pub fn error_message(&mut self, message: &str) -> Result<()> {
        self.event(EventKind::ErrorMessage, 0, &prefixed(message.as_bytes())?)
    }

    /// Write raw bytes with no padding or framing
    pub fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes)
    }

    /// Pad to the alignment boundary
    pub fn align(&mut self) -> Result<()> {
        let boundary = self.alignment as u64;
        if boundary > 1 && self.written % boundary != 0 {
            let pad = (boundary - self.written % boundary) as usize;
            self.put(&[0u8; 256][..pad])?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn cell(&mut self, kind: EventKind, column: ColumnId, count: u32, data: &[u8]) -> Result<()> {
        let mut payload = BytesMut::with_capacity(4 + data.len());
        payload.put_u32_ne(count);
        payload.put_slice(data);
        self.event(kind, column.0, &payload)
    }

    fn event(&mut self, kind: EventKind, id: u32, payload: &[u8]) -> Result<()> {
        let header = EventHeader::new(kind, id)?;
        self.align()?;
        self.put(&header.encode().to_ne_bytes())?;
        self.put(payload)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| LoaderError::PayloadTooLarge {
        size: len as u64,
        max: u32::MAX as u64,
    })
}

fn prefixed(bytes: &[u8]) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(4 + bytes.len());
    buf.put_u32_ne(len_u32(bytes.len())?);
    buf.put_slice(bytes);
    Ok(buf)
}
