//! Directory backend
//!
//! Stores each database as a directory tree of column files.
//!
//! ## Layout
//! ```text
//! {output_root}/{database}/
//!   ├── schema.txt            (compiled schema text)
//!   ├── db.meta               (bincode DatabaseMeta)
//!   └── {table}/
//!         ├── {column}.col     (cell records)
//!         ├── {column}.default (single record, if a default was set)
//!         ├── table.meta       (bincode TableMeta, written on commit)
//!         └── index            (bincode TableIndex, written on reindex)
//! ```
//!
//! ## Cell Record Format
//! ```text
//! ┌─────────┬───────────────┬───────────┬─────────┬─────────┬────────┐
//! │ Row (8) │ ElemBits (4)  │ Count (4) │ Len (4) │ CRC (4) │  Data  │
//! └─────────┴───────────────┴───────────┴─────────┴─────────┴────────┘
//! ```
//! All integers little-endian; the CRC covers `Data`.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{LoaderError, Result};
use super::{Backend, ColumnHandle};

/// Size of a cell record header
pub const RECORD_HEADER_SIZE: usize = 24;

/// Index offset of a row that has no value and no default
pub const NO_VALUE: u64 = u64::MAX;

const SCHEMA_FILENAME: &str = "schema.txt";
const DB_META_FILENAME: &str = "db.meta";
const TABLE_META_FILENAME: &str = "table.meta";
const INDEX_FILENAME: &str = "index";

/// Database-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    pub schema_name: String,
    pub schema_sources: Vec<String>,
}

/// Column metadata stored in `table.meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub elem_bits: u32,
    pub has_default: bool,
}

/// Table metadata written when the cursor is committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub rows: u64,
    pub columns: Vec<ColumnMeta>,
}

/// Per-row record offsets for every column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    pub rows: u64,
    pub columns: Vec<(String, Vec<u64>)>,
}

/// One decoded cell record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRecord {
    pub row: u64,
    pub elem_bits: u32,
    pub count: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct PendingCell {
    elem_bits: u32,
    count: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct DirColumn {
    name: String,
    elem_bits: u32,
    writer: Option<BufWriter<File>>,
    position: u64,
    offsets: Vec<u64>,
    default: Option<PendingCell>,
}

/// Write cursor of the directory backend
#[derive(Debug)]
pub struct DirCursor {
    name: String,
    dir: PathBuf,
    columns: Vec<DirColumn>,
    opened: bool,
    row: Option<Vec<Option<PendingCell>>>,
    rows: u64,
}

impl DirCursor {
    fn column(&mut self, handle: ColumnHandle) -> Result<&mut DirColumn> {
        let name = &self.name;
        self.columns.get_mut(handle.0 as usize).ok_or_else(|| {
            LoaderError::Backend(format!(
                "column handle {} out of range on table '{}'",
                handle.0, name
            ))
        })
    }

    fn current_row(&mut self) -> Result<&mut Vec<Option<PendingCell>>> {
        let name = &self.name;
        self.row
            .as_mut()
            .ok_or_else(|| LoaderError::Backend(format!("no open row on table '{}'", name)))
    }
}

#[derive(Debug)]
struct CompiledSchema {
    name: String,
    text: String,
    sources: Vec<String>,
}

/// Backend writing databases as directories of column files
#[derive(Debug)]
pub struct DirBackend {
    root: PathBuf,
    include_paths: Vec<PathBuf>,
    schema_files: Vec<PathBuf>,
    schema: Option<CompiledSchema>,
    database: Option<PathBuf>,
}

impl DirBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.output_root.clone(),
            include_paths: config.schema_include_paths.clone(),
            schema_files: config.schema_files.clone(),
            schema: None,
            database: None,
        }
    }

    /// Read `table.meta` of a committed table
    pub fn load_table_meta(table_dir: &Path) -> Result<TableMeta> {
        let path = table_dir.join(TABLE_META_FILENAME);
        decode(&fs::read(&path).map_err(backend_io(path.display()))?)
    }

    /// Read the `index` of a reindexed table
    pub fn load_index(table_dir: &Path) -> Result<TableIndex> {
        let path = table_dir.join(INDEX_FILENAME);
        decode(&fs::read(&path).map_err(backend_io(path.display()))?)
    }

    /// Read `db.meta` of a database
    pub fn load_database_meta(db_dir: &Path) -> Result<DatabaseMeta> {
        let path = db_dir.join(DB_META_FILENAME);
        decode(&fs::read(&path).map_err(backend_io(path.display()))?)
    }

    /// Read and verify every record of a column file
    pub fn read_records(path: &Path) -> Result<Vec<ColumnRecord>> {
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(backend_io(path.display()))?;

        let mut records = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            if pos + RECORD_HEADER_SIZE > bytes.len() {
                return Err(LoaderError::Backend(format!(
                    "truncated record header at {} in {}",
                    pos,
                    path.display()
                )));
            }
            let mut header = &bytes[pos..pos + RECORD_HEADER_SIZE];
            let row = header.get_u64_le();
            let elem_bits = header.get_u32_le();
            let count = header.get_u32_le();
            let len = header.get_u32_le() as usize;
            let crc = header.get_u32_le();
            pos += RECORD_HEADER_SIZE;

            if pos + len > bytes.len() {
                return Err(LoaderError::Backend(format!(
                    "truncated record data at {} in {}",
                    pos,
                    path.display()
                )));
            }
            let data = &bytes[pos..pos + len];
            if crc32fast::hash(data) != crc {
                return Err(LoaderError::Backend(format!(
                    "checksum mismatch for row {} in {}",
                    row,
                    path.display()
                )));
            }
            pos += len;

            records.push(ColumnRecord {
                row,
                elem_bits,
                count,
                data: data.to_vec(),
            });
        }
        Ok(records)
    }

    fn database(&self) -> Result<&Path> {
        self.database
            .as_deref()
            .ok_or_else(|| LoaderError::Backend("no database created".to_string()))
    }
}

impl Backend for DirBackend {
    type Cursor = DirCursor;

    fn compile_schema(&mut self, content: &str, name: &str) -> Result<()> {
        for path in &self.include_paths {
            if path.is_dir() {
                tracing::info!("Added schema include path '{}'", path.display());
            } else {
                tracing::info!("Schema include path not found: '{}'", path.display());
            }
        }

        let mut text = String::new();
        let mut sources = Vec::new();
        if !content.is_empty() {
            text.push_str(content);
            sources.push("<inline>".to_string());
        }

        // With no inline content the schema comes from the configured files
        for path in &self.schema_files {
            match fs::read_to_string(path) {
                Ok(file_text) => {
                    tracing::info!("Added schema file '{}'", path.display());
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&file_text);
                    sources.push(path.display().to_string());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!("Schema file not found: '{}'", path.display());
                }
                Err(e) => {
                    return Err(backend_io(format!("schema file '{}'", path.display()))(e))
                }
            }
        }

        if sources.is_empty() {
            return Err(LoaderError::SchemaNotFound(name.to_string()));
        }

        self.schema = Some(CompiledSchema {
            name: name.to_string(),
            text,
            sources,
        });
        Ok(())
    }

    fn open_or_create_database(&mut self, path: &str) -> Result<()> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| LoaderError::Backend("database created before schema".to_string()))?;
        if path.is_empty() {
            return Err(LoaderError::Backend("empty database path".to_string()));
        }

        let db_dir = self.root.join(path);
        if db_dir.exists() {
            let mut entries = fs::read_dir(&db_dir).map_err(backend_io(db_dir.display()))?;
            if entries.next().is_some() {
                return Err(LoaderError::Backend(format!(
                    "database '{}' already exists",
                    db_dir.display()
                )));
            }
        }

        let meta = encode(&DatabaseMeta {
            schema_name: schema.name.clone(),
            schema_sources: schema.sources.clone(),
        })?;
        populate_new_dir(&db_dir, |dir| {
            fs::write(dir.join(SCHEMA_FILENAME), schema.text.as_bytes())?;
            fs::write(dir.join(DB_META_FILENAME), &meta)
        })?;

        tracing::info!(
            "Database created, schema spec='{}', database='{}'",
            schema.name,
            db_dir.display()
        );
        self.database = Some(db_dir);
        Ok(())
    }

    fn create_table_cursor(&mut self, table_name: &str) -> Result<DirCursor> {
        check_component(table_name, "table")?;
        let dir = self.database()?.join(table_name);
        fs::create_dir(&dir).map_err(|e| {
            LoaderError::Backend(format!("cannot create table '{}': {}", table_name, e))
        })?;

        Ok(DirCursor {
            name: table_name.to_string(),
            dir,
            columns: Vec::new(),
            opened: false,
            row: None,
            rows: 0,
        })
    }

    fn add_column(
        &mut self,
        cursor: &mut DirCursor,
        name: &str,
        elem_bits: u32,
    ) -> Result<ColumnHandle> {
        check_component(name, "column")?;
        if cursor.opened {
            return Err(LoaderError::Backend(format!(
                "cannot add column '{}' to open cursor on '{}'",
                name, cursor.name
            )));
        }
        if cursor.columns.iter().any(|c| c.name == name) {
            return Err(LoaderError::Backend(format!(
                "column '{}' already exists on '{}'",
                name, cursor.name
            )));
        }

        cursor.columns.push(DirColumn {
            name: name.to_string(),
            elem_bits,
            writer: None,
            position: 0,
            offsets: Vec::new(),
            default: None,
        });
        Ok(ColumnHandle(cursor.columns.len() as u32 - 1))
    }

    fn open_cursor(&mut self, cursor: &mut DirCursor) -> Result<()> {
        if cursor.opened {
            return Err(LoaderError::Backend(format!("cursor on '{}' already open", cursor.name)));
        }
        for column in &mut cursor.columns {
            let path = cursor.dir.join(format!("{}.col", column.name));
            let file = File::create(&path).map_err(backend_io(path.display()))?;
            column.writer = Some(BufWriter::new(file));
        }
        cursor.opened = true;
        Ok(())
    }

    fn open_row(&mut self, cursor: &mut DirCursor) -> Result<()> {
        if !cursor.opened {
            return Err(LoaderError::Backend(format!("cursor on '{}' not open", cursor.name)));
        }
        if cursor.row.is_some() {
            return Err(LoaderError::Backend(format!("row already open on '{}'", cursor.name)));
        }
        cursor.row = Some(vec![None; cursor.columns.len()]);
        Ok(())
    }

    fn write_cell(
        &mut self,
        cursor: &mut DirCursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()> {
        cursor.column(column)?;
        let row = cursor.current_row()?;
        row[column.0 as usize] = Some(PendingCell {
            elem_bits,
            count,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn write_default(
        &mut self,
        cursor: &mut DirCursor,
        column: ColumnHandle,
        elem_bits: u32,
        data: &[u8],
        count: u32,
    ) -> Result<()> {
        cursor.column(column)?.default = Some(PendingCell {
            elem_bits,
            count,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn close_row(&mut self, cursor: &mut DirCursor) -> Result<()> {
        cursor.current_row()?;
        cursor.row = None;
        Ok(())
    }

    fn commit_row(&mut self, cursor: &mut DirCursor) -> Result<()> {
        let row_id = cursor.rows;
        let name = cursor.name.clone();
        let cells = cursor
            .row
            .as_ref()
            .ok_or_else(|| LoaderError::Backend(format!("no open row on table '{}'", name)))?;

        for (column, cell) in cursor.columns.iter_mut().zip(cells.iter()) {
            let cell = match cell.as_ref().or(column.default.as_ref()) {
                Some(cell) => cell,
                None => {
                    column.offsets.push(NO_VALUE);
                    continue;
                }
            };
            let writer = column.writer.as_mut().ok_or_else(|| {
                LoaderError::Backend(format!("column '{}' not open", column.name))
            })?;
            column.offsets.push(column.position);
            column.position += write_record(writer, row_id, cell)
                .map_err(backend_io(format_args!("column '{}'", column.name)))?;
        }
        cursor.rows += 1;
        Ok(())
    }

    fn commit_cursor(&mut self, cursor: &mut DirCursor) -> Result<()> {
        if cursor.row.is_some() {
            return Err(LoaderError::Backend(format!(
                "commit with open row on '{}'",
                cursor.name
            )));
        }

        let mut columns = Vec::with_capacity(cursor.columns.len());
        for column in &mut cursor.columns {
            if let Some(writer) = column.writer.as_mut() {
                writer
                    .flush()
                    .map_err(backend_io(format_args!("column '{}'", column.name)))?;
            }
            if let Some(default) = &column.default {
                let path = cursor.dir.join(format!("{}.default", column.name));
                File::create(&path)
                    .and_then(|file| {
                        let mut writer = BufWriter::new(file);
                        write_record(&mut writer, 0, default)?;
                        writer.flush()
                    })
                    .map_err(backend_io(path.display()))?;
            }
            columns.push(ColumnMeta {
                name: column.name.clone(),
                elem_bits: column.elem_bits,
                has_default: column.default.is_some(),
            });
        }

        let meta = TableMeta {
            name: cursor.name.clone(),
            rows: cursor.rows,
            columns,
        };
        let path = cursor.dir.join(TABLE_META_FILENAME);
        fs::write(&path, encode(&meta)?).map_err(backend_io(path.display()))?;
        tracing::debug!(table = %cursor.name, rows = cursor.rows, "table committed");
        Ok(())
    }

    fn reindex_parent(&mut self, cursor: &mut DirCursor) -> Result<()> {
        let index = TableIndex {
            rows: cursor.rows,
            columns: cursor
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.offsets.clone()))
                .collect(),
        };
        let path = cursor.dir.join(INDEX_FILENAME);
        fs::write(&path, encode(&index)?).map_err(backend_io(path.display()))?;
        Ok(())
    }

    fn release_cursor(&mut self, cursor: DirCursor) -> Result<()> {
        drop(cursor);
        Ok(())
    }

    fn remove_database(&mut self, path: &str) -> Result<()> {
        let db_dir = self.root.join(path);
        if db_dir.exists() {
            fs::remove_dir_all(&db_dir).map_err(backend_io(db_dir.display()))?;
            tracing::info!("Removed database '{}'", db_dir.display());
        }
        self.database = None;
        Ok(())
    }
}

/// Table and column names become path components
fn check_component(name: &str, what: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err(LoaderError::Backend(format!("invalid {} name '{}'", what, name))),
    }
}

/// Create `dir` and fill it, removing it again if filling fails
fn populate_new_dir<F>(dir: &Path, populate: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    fs::create_dir_all(dir).map_err(backend_io(dir.display()))?;
    if let Err(e) = populate(dir) {
        if let Err(cleanup) = fs::remove_dir_all(dir) {
            tracing::warn!("Failed to remove '{}': {}", dir.display(), cleanup);
        }
        return Err(backend_io(dir.display())(e));
    }
    Ok(())
}

/// Filesystem failures of the backend are backend errors, not stream errors
fn backend_io<C: fmt::Display>(context: C) -> impl FnOnce(io::Error) -> LoaderError {
    move |e| LoaderError::Backend(format!("{}: {}", context, e))
}

fn write_record(writer: &mut impl Write, row: u64, cell: &PendingCell) -> io::Result<u64> {
    let mut header = BytesMut::with_capacity(RECORD_HEADER_SIZE);
    header.put_u64_le(row);
    header.put_u32_le(cell.elem_bits);
    header.put_u32_le(cell.count);
    header.put_u32_le(cell.data.len() as u32);
    header.put_u32_le(crc32fast::hash(&cell.data));
    writer.write_all(&header)?;
    writer.write_all(&cell.data)?;
    Ok((RECORD_HEADER_SIZE + cell.data.len()) as u64)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LoaderError::Backend(format!("encode metadata: {}", e)))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| LoaderError::Backend(format!("decode metadata: {}", e)))
}
