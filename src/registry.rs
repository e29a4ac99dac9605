//! Id Registries
//!
//! Maps producer-assigned table and column ids to the loader's cursor slots
//! and backend column handles. Entries are only ever inserted; the whole
//! registry is cleared between loads.

use std::collections::HashMap;

use crate::backend::ColumnHandle;
use crate::error::{LoaderError, Result};
use crate::protocol::{ColumnId, TableId};

/// Everything the loader needs to write into a registered column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnEntry {
    /// Index into the session's cursor list
    pub cursor: usize,

    /// Handle returned by the backend when the column was added
    pub handle: ColumnHandle,

    /// Bits per element
    pub elem_bits: u32,
}

/// Table and column id registries
#[derive(Debug, Default)]
pub struct Registry {
    tables: HashMap<TableId, usize>,
    columns: HashMap<ColumnId, ColumnEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor index of a registered table
    pub fn table(&self, id: TableId) -> Option<usize> {
        self.tables.get(&id).copied()
    }

    pub fn contains_table(&self, id: TableId) -> bool {
        self.tables.contains_key(&id)
    }

    /// Register a table, failing if the id is taken
    pub fn insert_table(&mut self, id: TableId, cursor: usize) -> Result<()> {
        if self.tables.contains_key(&id) {
            return Err(LoaderError::TableExists(id));
        }
        self.tables.insert(id, cursor);
        Ok(())
    }

    pub fn column(&self, id: ColumnId) -> Option<ColumnEntry> {
        self.columns.get(&id).copied()
    }

    pub fn contains_column(&self, id: ColumnId) -> bool {
        self.columns.contains_key(&id)
    }

    /// Register a column, failing if the id is taken
    pub fn insert_column(&mut self, id: ColumnId, entry: ColumnEntry) -> Result<()> {
        if self.columns.contains_key(&id) {
            return Err(LoaderError::ColumnExists(id));
        }
        self.columns.insert(id, entry);
        Ok(())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.columns.clear();
    }
}
