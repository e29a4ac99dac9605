//! Event header definitions
//!
//! The event header is a single native-endian `u32`: the top 8 bits carry the
//! event kind, the low 24 bits carry the producer-assigned id.

use std::fmt;

use crate::error::{LoaderError, Result};

/// Largest producer id that fits in an event header
pub const MAX_ID: u32 = 0x00FF_FFFF;

const KIND_SHIFT: u32 = 24;

/// Event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    ErrorMessage = 1,
    EndStream = 2,
    RemotePath = 3,
    UseSchema = 4,
    NewTable = 5,
    NewColumn = 6,
    OpenStream = 7,
    CellDefault = 8,
    CellData = 9,
    NextRow = 10,
}

impl EventKind {
    /// Map a raw kind byte, `None` for anything the loader does not know
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => EventKind::ErrorMessage,
            2 => EventKind::EndStream,
            3 => EventKind::RemotePath,
            4 => EventKind::UseSchema,
            5 => EventKind::NewTable,
            6 => EventKind::NewColumn,
            7 => EventKind::OpenStream,
            8 => EventKind::CellDefault,
            9 => EventKind::CellData,
            10 => EventKind::NextRow,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ErrorMessage => "Error-Message",
            EventKind::EndStream => "End-Stream",
            EventKind::RemotePath => "Remote-Path",
            EventKind::UseSchema => "Use-Schema",
            EventKind::NewTable => "New-Table",
            EventKind::NewColumn => "New-Column",
            EventKind::OpenStream => "Open-Stream",
            EventKind::CellDefault => "Cell-Default",
            EventKind::CellData => "Cell-Data",
            EventKind::NextRow => "Next-Row",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Producer-assigned table id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

/// Producer-assigned column id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded event header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub kind: EventKind,
    pub id: u32,
}

impl EventHeader {
    pub fn new(kind: EventKind, id: u32) -> Result<Self> {
        if id > MAX_ID {
            return Err(LoaderError::IdOutOfRange(id));
        }
        Ok(Self { kind, id })
    }

    /// Split a raw header word into kind and id
    ///
    /// `offset` is only used to report an unknown kind.
    pub fn decode(raw: u32, offset: u64) -> Result<Self> {
        let kind_byte = (raw >> KIND_SHIFT) as u8;
        let kind = EventKind::from_u8(kind_byte).ok_or(LoaderError::UnexpectedEvent {
            kind: kind_byte,
            offset,
        })?;
        Ok(Self {
            kind,
            id: raw & MAX_ID,
        })
    }

    pub fn encode(&self) -> u32 {
        ((self.kind as u32) << KIND_SHIFT) | (self.id & MAX_ID)
    }

    pub fn table_id(&self) -> TableId {
        TableId(self.id)
    }

    pub fn column_id(&self) -> ColumnId {
        ColumnId(self.id)
    }
}

/// Bytes occupied by `count` elements of `elem_bits` bits, rounded up
pub fn payload_len(elem_bits: u32, count: u32) -> u64 {
    (elem_bits as u64 * count as u64).div_ceil(8)
}
