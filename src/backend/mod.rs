//! Backend Module
//!
//! The storage engine the loader drives. The loader only holds opaque cursor
//! and column handles; the backend owns everything behind them.
//!
//! ## Responsibilities
//! - Compile the selected schema
//! - Create the database and one table + write cursor per `New-Table`
//! - Accept cell writes and row/cursor lifecycle calls
//! - Remove a partially built database when a load fails
//!
//! ## Cursor Lifecycle
//! ```text
//! create_table_cursor ─► add_column* ─► open_cursor ─► open_row
//!        ┌──────────────────────────────────────────────┘
//!        ▼
//!   write_cell* ─► commit_row ─► close_row ─► open_row ─► ...
//!        ...
//!   close_row ─► commit_cursor ─► reindex_parent ─► release_cursor
//! ```

mod dir;
mod memory;

pub use dir::{
    ColumnMeta, ColumnRecord, DatabaseMeta, DirBackend, DirCursor, TableIndex, TableMeta,
    NO_VALUE,
};
pub use memory::{
    BackendCall, CallKind, MemoryBackend, MemoryCursor, MemoryStore, MemoryTable, StoredCell,
};

use crate::error::Result;

/// Backend-assigned column handle, scoped to one cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnHandle(pub u32);

/// A columnar storage engine
pub trait Backend {
    /// Write cursor bound to one table
    type Cursor;

    /// Compile the schema; empty `content` means externally configured files
    fn compile_schema(&mut self, content: &str, name: &str) -> Result<()>;

    /// Create the target database under the compiled schema
    fn open_or_create_database(&mut self, path: &str) -> Result<()>;

    /// Create a table and a write cursor on it
    fn create_table_cursor(&mut self, table_name: &str) -> Result<Self::Cursor>;

    /// Add a column of `elem_bits`-bit elements to the cursor's table
    fn add_column(
        &mut self,
        cursor: &mut Self::Cursor,
        name: &str,
        elem_bits: u32,
    ) -> Result<ColumnHandle>;

    fn open_cursor(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    fn open_row(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    /// Write `count` elements of `elem_bits` bits into the current row
    fn write_cell(
        &mut self,
        cursor: &mut Self::Cursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()>;

    /// Set the value used for rows that never write this column
    fn write_default(
        &mut self,
        cursor: &mut Self::Cursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()>;

    fn close_row(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    fn commit_row(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    fn commit_cursor(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    /// Post-process the cursor's table once all rows are committed
    fn reindex_parent(&mut self, cursor: &mut Self::Cursor) -> Result<()>;

    /// Give the cursor back; it is never used again
    fn release_cursor(&mut self, cursor: Self::Cursor) -> Result<()>;

    /// Delete a partially built database after a failed load
    fn remove_database(&mut self, path: &str) -> Result<()>;
}
