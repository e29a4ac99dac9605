//! Protocol Module
//!
//! Defines the wire format produced by the producer and consumed by the
//! loader. All integers are in the producer's byte order, which must match the
//! loader's.
//!
//! ## Stream Layout
//! ```text
//! ┌──────────────────┬──────────┬─────┬──────────┬─────┬──────────┐
//! │ Header (24 + ext)│ Event 1  │ pad │ Event 2  │ pad │   ...    │
//! └──────────────────┴──────────┴─────┴──────────┴─────┴──────────┘
//! ```
//!
//! ### Event Format
//! ```text
//! ┌─────────────────────────────┬─────────────────────────────┐
//! │ Kind (8 bits) │ Id (24 bits)│          Payload            │
//! └─────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Event Kind
//! - Use-Schema:   content_len (4) + name_len (4) + content + name
//! - Remote-Path:  len (4) + path
//! - New-Table:    len (4) + name
//! - New-Column:   table_id (4) + elem_bits (4) + len (4) + name
//! - Cell-Data:    count (4) + ceil(elem_bits * count / 8) bytes
//! - Cell-Default: same as Cell-Data
//! - Error-Message: len (4) + text
//! - Open-Stream, End-Stream, Next-Row: empty
//!
//! Padding brings every event start to a multiple of the alignment boundary,
//! counted from the first byte of the stream.

mod event;
mod header;
mod reader;
mod writer;

pub use event::{
    payload_len, ColumnId, EventHeader, EventKind, TableId, MAX_ID,
};
pub use header::{
    Endianness, StreamHeader, CURRENT_VERSION, GOOD_ENDIAN, HEADER_SIZE, REVERSE_ENDIAN,
    SIGNATURE,
};
pub use reader::ExactReader;
pub use writer::StreamWriter;
