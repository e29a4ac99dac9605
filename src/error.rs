//! Error types for the general loader
//!
//! Provides a unified error type for all operations, classified into the
//! kinds reported to callers: format, I/O, protocol, backend and config.

use thiserror::Error;

use crate::protocol::{ColumnId, EventKind, TableId};

/// Result type alias using LoaderError
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Coarse classification of a [`LoaderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad signature, unsupported endianness/version/packing, malformed header
    Format,
    /// Short read or failure of the byte source
    Io,
    /// Producer broke the event protocol
    Protocol,
    /// The storage backend refused an operation
    Backend,
    /// Invalid loader configuration
    Config,
}

/// Unified error type for loader operations
#[derive(Debug, Error)]
pub enum LoaderError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt stream header: bad signature {0:?}")]
    BadSignature(String),

    #[error("Unsupported stream: reverse endianness")]
    ReverseEndian,

    #[error("Invalid endianness marker: 0x{0:08x}")]
    InvalidEndian(u32),

    #[error("Unsupported stream version {found} (expected {expected})")]
    BadVersion { found: u32, expected: u32 },

    #[error("Unsupported stream: packed format")]
    PackedFormat,

    #[error("Malformed stream header: {0}")]
    MalformedHeader(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Table {0} already exists")]
    TableExists(TableId),

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Column {0} already exists")]
    ColumnExists(ColumnId),

    #[error("Column {0} not found")]
    ColumnNotFound(ColumnId),

    #[error("Unexpected event kind {kind} at offset {offset}")]
    UnexpectedEvent { kind: u8, offset: u64 },

    #[error("Producer reported an error: {0}")]
    ProducerError(String),

    #[error("Schema already selected")]
    SchemaAlreadySet,

    #[error("No schema selected")]
    SchemaNotSet,

    #[error("Database already selected")]
    DatabaseAlreadySet,

    #[error("No database selected")]
    DatabaseNotSet,

    #[error("Stream is not open")]
    StreamNotOpen,

    #[error("Stream is already open")]
    StreamAlreadyOpen,

    #[error("Cursor of table {0} is already open, cannot add columns")]
    CursorAlreadyOpen(TableId),

    #[error("Invalid element width {0} bits")]
    InvalidElementWidth(u32),

    #[error("Invalid UTF-8 in {0}")]
    InvalidText(&'static str),

    #[error("Id {0} does not fit in 24 bits")]
    IdOutOfRange(u32),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Context
    // -------------------------------------------------------------------------
    #[error("At offset {offset}: {source}")]
    AtOffset {
        offset: u64,
        #[source]
        source: Box<LoaderError>,
    },

    #[error("{event} event (id={id}) at offset {offset}: {source}")]
    Event {
        event: EventKind,
        id: u32,
        offset: u64,
        #[source]
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// Attach event context to an error raised while handling that event
    pub fn in_event(event: EventKind, id: u32, offset: u64, source: LoaderError) -> Self {
        LoaderError::Event {
            event,
            id,
            offset,
            source: Box::new(source),
        }
    }

    /// Attach the stream offset to an error raised between events
    pub fn at_offset(offset: u64, source: LoaderError) -> Self {
        LoaderError::AtOffset {
            offset,
            source: Box::new(source),
        }
    }

    /// The innermost error, with any offset or event context peeled off
    pub fn root(&self) -> &LoaderError {
        match self {
            LoaderError::AtOffset { source, .. } | LoaderError::Event { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            LoaderError::Io(_) => ErrorKind::Io,

            LoaderError::BadSignature(_)
            | LoaderError::ReverseEndian
            | LoaderError::InvalidEndian(_)
            | LoaderError::BadVersion { .. }
            | LoaderError::PackedFormat
            | LoaderError::MalformedHeader(_)
            | LoaderError::PayloadTooLarge { .. } => ErrorKind::Format,

            LoaderError::Backend(_) | LoaderError::SchemaNotFound(_) => ErrorKind::Backend,

            LoaderError::Config(_) => ErrorKind::Config,

            _ => ErrorKind::Protocol,
        }
    }
}
