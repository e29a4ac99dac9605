//! Load session state
//!
//! Everything one load owns: registries, the cursor list and the schema and
//! database contexts. Rebuilt from scratch for every load.

use crate::protocol::TableId;
use crate::registry::Registry;

/// A backend cursor together with the table it was created for
#[derive(Debug)]
pub struct CursorSlot<C> {
    pub table: TableId,
    pub name: String,
    pub cursor: C,

    /// `open_cursor` and the first `open_row` have been issued
    pub opened: bool,
}

/// The schema selected by `Use-Schema`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaContext {
    pub name: String,
}

/// State of one load
#[derive(Debug)]
pub struct LoadSession<C> {
    pub registry: Registry,
    pub cursors: Vec<CursorSlot<C>>,
    pub schema: Option<SchemaContext>,

    /// Database path, recorded once the backend has created it
    pub database: Option<String>,

    pub stream_open: bool,
}

impl<C> LoadSession<C> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            cursors: Vec::new(),
            schema: None,
            database: None,
            stream_open: false,
        }
    }
}

impl<C> Default for LoadSession<C> {
    fn default() -> Self {
        Self::new()
    }
}
