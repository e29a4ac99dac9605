//! In-memory backend
//!
//! Keeps every table in memory behind a shared [`MemoryStore`] handle and
//! journals each call, so a load can be inspected after the loader is gone.
//! Enforces the cursor lifecycle: rows can only be written on an opened
//! cursor with an open row, columns can only be added before opening.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoaderError, Result};
use super::{Backend, ColumnHandle};

/// One cell value as written by the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCell {
    pub elem_bits: u32,
    pub count: u32,
    pub data: Vec<u8>,
}

/// A table held by the in-memory backend
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<String>,
    pub elem_bits: Vec<u32>,
    pub defaults: Vec<Option<StoredCell>>,

    /// Committed rows; a cell left unwritten falls back to the column default
    pub rows: Vec<Vec<Option<StoredCell>>>,

    pub committed: bool,
    pub reindexed: bool,
}

impl MemoryTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell of a committed row, with the column default applied
    pub fn cell(&self, row: usize, column: &str) -> Option<&StoredCell> {
        let idx = self.column_index(column)?;
        let row = self.rows.get(row)?;
        row.get(idx)
            .and_then(|cell| cell.as_ref())
            .or_else(|| self.defaults.get(idx).and_then(|d| d.as_ref()))
    }
}

/// Kinds of backend calls, for journal comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CompileSchema,
    OpenOrCreateDatabase,
    CreateTableCursor,
    AddColumn,
    OpenCursor,
    OpenRow,
    WriteCell,
    WriteDefault,
    CloseRow,
    CommitRow,
    CommitCursor,
    ReindexParent,
    ReleaseCursor,
    RemoveDatabase,
}

/// A journaled backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CompileSchema { name: String, inline: bool },
    OpenOrCreateDatabase { path: String },
    CreateTableCursor { table: String },
    AddColumn { table: String, column: String, elem_bits: u32 },
    OpenCursor { table: String },
    OpenRow { table: String },
    WriteCell { table: String, column: ColumnHandle, elem_bits: u32, count: u32 },
    WriteDefault { table: String, column: ColumnHandle, elem_bits: u32, count: u32 },
    CloseRow { table: String },
    CommitRow { table: String },
    CommitCursor { table: String },
    ReindexParent { table: String },
    ReleaseCursor { table: String },
    RemoveDatabase { path: String },
}

impl BackendCall {
    pub fn kind(&self) -> CallKind {
        match self {
            BackendCall::CompileSchema { .. } => CallKind::CompileSchema,
            BackendCall::OpenOrCreateDatabase { .. } => CallKind::OpenOrCreateDatabase,
            BackendCall::CreateTableCursor { .. } => CallKind::CreateTableCursor,
            BackendCall::AddColumn { .. } => CallKind::AddColumn,
            BackendCall::OpenCursor { .. } => CallKind::OpenCursor,
            BackendCall::OpenRow { .. } => CallKind::OpenRow,
            BackendCall::WriteCell { .. } => CallKind::WriteCell,
            BackendCall::WriteDefault { .. } => CallKind::WriteDefault,
            BackendCall::CloseRow { .. } => CallKind::CloseRow,
            BackendCall::CommitRow { .. } => CallKind::CommitRow,
            BackendCall::CommitCursor { .. } => CallKind::CommitCursor,
            BackendCall::ReindexParent { .. } => CallKind::ReindexParent,
            BackendCall::ReleaseCursor { .. } => CallKind::ReleaseCursor,
            BackendCall::RemoveDatabase { .. } => CallKind::RemoveDatabase,
        }
    }

    /// Table the call was made on, for cursor-level calls
    pub fn table(&self) -> Option<&str> {
        match self {
            BackendCall::CreateTableCursor { table }
            | BackendCall::AddColumn { table, .. }
            | BackendCall::OpenCursor { table }
            | BackendCall::OpenRow { table }
            | BackendCall::WriteCell { table, .. }
            | BackendCall::WriteDefault { table, .. }
            | BackendCall::CloseRow { table }
            | BackendCall::CommitRow { table }
            | BackendCall::CommitCursor { table }
            | BackendCall::ReindexParent { table }
            | BackendCall::ReleaseCursor { table } => Some(table),
            BackendCall::CompileSchema { .. }
            | BackendCall::OpenOrCreateDatabase { .. }
            | BackendCall::RemoveDatabase { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    schema: Option<(String, String)>,
    database: Option<String>,
    tables: Vec<MemoryTable>,
    journal: Vec<BackendCall>,
    removed: Vec<String>,
    live_cursors: usize,
    fail_on: Option<CallKind>,
}

/// Shared view of an in-memory backend's contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Every call made so far, in order
    pub fn journal(&self) -> Vec<BackendCall> {
        self.inner.lock().journal.clone()
    }

    pub fn call_kinds(&self) -> Vec<CallKind> {
        self.inner.lock().journal.iter().map(BackendCall::kind).collect()
    }

    /// Call kinds made on one table, in order
    pub fn calls_for(&self, table: &str) -> Vec<CallKind> {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| call.table() == Some(table))
            .map(BackendCall::kind)
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    /// Schema content and name, once compiled
    pub fn schema(&self) -> Option<(String, String)> {
        self.inner.lock().schema.clone()
    }

    pub fn database(&self) -> Option<String> {
        self.inner.lock().database.clone()
    }

    pub fn tables(&self) -> Vec<MemoryTable> {
        self.inner.lock().tables.clone()
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.inner.lock().tables.iter().find(|t| t.name == name).cloned()
    }

    /// Databases removed after failed loads
    pub fn removed_databases(&self) -> Vec<String> {
        self.inner.lock().removed.clone()
    }

    /// Cursors created but not yet released
    pub fn live_cursors(&self) -> usize {
        self.inner.lock().live_cursors
    }
}

/// Write cursor of the in-memory backend
#[derive(Debug)]
pub struct MemoryCursor {
    table: usize,
    name: String,
    opened: bool,
    row: Option<Vec<Option<StoredCell>>>,
}

/// Backend that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: MemoryStore,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `kind` fail, after journaling it
    pub fn failing_on(kind: CallKind) -> Self {
        let backend = Self::new();
        backend.store.inner.lock().fail_on = Some(kind);
        backend
    }

    /// A handle that stays valid after the backend is dropped
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    fn record(&self, call: BackendCall) -> Result<()> {
        let mut inner = self.store.inner.lock();
        let kind = call.kind();
        inner.journal.push(call);
        if inner.fail_on == Some(kind) {
            return Err(LoaderError::Backend(format!("injected failure in {:?}", kind)));
        }
        Ok(())
    }

    fn row<'a>(cursor: &'a mut MemoryCursor, op: &str) -> Result<&'a mut Vec<Option<StoredCell>>> {
        let name = &cursor.name;
        cursor
            .row
            .as_mut()
            .ok_or_else(|| LoaderError::Backend(format!("{}: no open row on table '{}'", op, name)))
    }

    fn check_column(&self, cursor: &MemoryCursor, column: ColumnHandle) -> Result<()> {
        let inner = self.store.inner.lock();
        if column.0 as usize >= inner.tables[cursor.table].columns.len() {
            return Err(LoaderError::Backend(format!(
                "column handle {} out of range on table '{}'",
                column.0, cursor.name
            )));
        }
        Ok(())
    }
}

impl Backend for MemoryBackend {
    type Cursor = MemoryCursor;

    fn compile_schema(&mut self, content: &str, name: &str) -> Result<()> {
        self.record(BackendCall::CompileSchema {
            name: name.to_string(),
            inline: !content.is_empty(),
        })?;
        self.store.inner.lock().schema = Some((content.to_string(), name.to_string()));
        Ok(())
    }

    fn open_or_create_database(&mut self, path: &str) -> Result<()> {
        self.record(BackendCall::OpenOrCreateDatabase { path: path.to_string() })?;
        let mut inner = self.store.inner.lock();
        if inner.schema.is_none() {
            return Err(LoaderError::Backend("database created before schema".to_string()));
        }
        inner.database = Some(path.to_string());
        Ok(())
    }

    fn create_table_cursor(&mut self, table_name: &str) -> Result<MemoryCursor> {
        self.record(BackendCall::CreateTableCursor { table: table_name.to_string() })?;
        let mut inner = self.store.inner.lock();
        if inner.database.is_none() {
            return Err(LoaderError::Backend("table created before database".to_string()));
        }
        if inner.tables.iter().any(|t| t.name == table_name) {
            return Err(LoaderError::Backend(format!("table '{}' already exists", table_name)));
        }
        inner.tables.push(MemoryTable {
            name: table_name.to_string(),
            ..MemoryTable::default()
        });
        inner.live_cursors += 1;
        Ok(MemoryCursor {
            table: inner.tables.len() - 1,
            name: table_name.to_string(),
            opened: false,
            row: None,
        })
    }

    fn add_column(
        &mut self,
        cursor: &mut MemoryCursor,
        name: &str,
        elem_bits: u32,
    ) -> Result<ColumnHandle> {
        self.record(BackendCall::AddColumn {
            table: cursor.name.clone(),
            column: name.to_string(),
            elem_bits,
        })?;
        if cursor.opened {
            return Err(LoaderError::Backend(format!(
                "cannot add column '{}' to open cursor on '{}'",
                name, cursor.name
            )));
        }
        let mut inner = self.store.inner.lock();
        let table = &mut inner.tables[cursor.table];
        if table.column_index(name).is_some() {
            return Err(LoaderError::Backend(format!(
                "column '{}' already exists on '{}'",
                name, cursor.name
            )));
        }
        table.columns.push(name.to_string());
        table.elem_bits.push(elem_bits);
        table.defaults.push(None);
        Ok(ColumnHandle(table.columns.len() as u32 - 1))
    }

    fn open_cursor(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::OpenCursor { table: cursor.name.clone() })?;
        if cursor.opened {
            return Err(LoaderError::Backend(format!("cursor on '{}' already open", cursor.name)));
        }
        cursor.opened = true;
        Ok(())
    }

    fn open_row(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::OpenRow { table: cursor.name.clone() })?;
        if !cursor.opened {
            return Err(LoaderError::Backend(format!("cursor on '{}' not open", cursor.name)));
        }
        if cursor.row.is_some() {
            return Err(LoaderError::Backend(format!("row already open on '{}'", cursor.name)));
        }
        let width = self.store.inner.lock().tables[cursor.table].columns.len();
        cursor.row = Some(vec![None; width]);
        Ok(())
    }

    fn write_cell(
        &mut self,
        cursor: &mut MemoryCursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()> {
        self.record(BackendCall::WriteCell {
            table: cursor.name.clone(),
            column,
            elem_bits,
            count,
        })?;
        self.check_column(cursor, column)?;
        let row = Self::row(cursor, "write_cell")?;
        row[column.0 as usize] = Some(StoredCell {
            elem_bits,
            count,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn write_default(
        &mut self,
        cursor: &mut MemoryCursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()> {
        self.record(BackendCall::WriteDefault {
            table: cursor.name.clone(),
            column,
            elem_bits,
            count,
        })?;
        self.check_column(cursor, column)?;
        let mut inner = self.store.inner.lock();
        inner.tables[cursor.table].defaults[column.0 as usize] = Some(StoredCell {
            elem_bits,
            count,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn close_row(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::CloseRow { table: cursor.name.clone() })?;
        Self::row(cursor, "close_row")?;
        cursor.row = None;
        Ok(())
    }

    fn commit_row(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::CommitRow { table: cursor.name.clone() })?;
        let row = Self::row(cursor, "commit_row")?.clone();
        self.store.inner.lock().tables[cursor.table].rows.push(row);
        Ok(())
    }

    fn commit_cursor(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::CommitCursor { table: cursor.name.clone() })?;
        if cursor.row.is_some() {
            return Err(LoaderError::Backend(format!(
                "commit with open row on '{}'",
                cursor.name
            )));
        }
        self.store.inner.lock().tables[cursor.table].committed = true;
        Ok(())
    }

    fn reindex_parent(&mut self, cursor: &mut MemoryCursor) -> Result<()> {
        self.record(BackendCall::ReindexParent { table: cursor.name.clone() })?;
        self.store.inner.lock().tables[cursor.table].reindexed = true;
        Ok(())
    }

    fn release_cursor(&mut self, cursor: MemoryCursor) -> Result<()> {
        let result = self.record(BackendCall::ReleaseCursor { table: cursor.name.clone() });
        let mut inner = self.store.inner.lock();
        inner.live_cursors = inner.live_cursors.saturating_sub(1);
        result
    }

    fn remove_database(&mut self, path: &str) -> Result<()> {
        self.record(BackendCall::RemoveDatabase { path: path.to_string() })?;
        let mut inner = self.store.inner.lock();
        inner.removed.push(path.to_string());
        inner.database = None;
        inner.tables.clear();
        Ok(())
    }
}
