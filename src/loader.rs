//! Loader Module
//!
//! The event dispatcher that replays a stream against a backend.
//!
//! ## Responsibilities
//! - Validate the stream header once
//! - Read events one at a time, aligned to the configured boundary
//! - Resolve producer ids through the registries before touching the backend
//! - Enforce event ordering (schema → database → tables/columns → rows)
//! - Release every cursor and remove a partial database on failure
//!
//! ## States
//! ```text
//! AwaitingHeader ──header ok──► Idle ──Open-Stream──► Streaming ──End-Stream──► Closed
//!        │                       │                       │
//!        └───────────────────────┴───────── error ───────┴──────────► Failed
//! ```

use std::io::Read;

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{LoaderError, Result};
use crate::protocol::{payload_len, EventHeader, EventKind, ExactReader, StreamHeader, TableId};
use crate::registry::ColumnEntry;
use crate::session::{CursorSlot, LoadSession, SchemaContext};

/// Where the loader is in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    AwaitingHeader,
    Idle,
    Streaming,
    Closed,
    Failed,
}

/// Counters for a finished load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub events: u64,
    pub tables: usize,
    pub columns: usize,
    pub rows: u64,
    pub cells: u64,
    pub defaults: u64,
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellTarget {
    Row,
    Default,
}

/// Replays an event stream against a backend
pub struct GeneralLoader<R, B: Backend> {
    reader: ExactReader<R>,
    backend: B,
    config: Config,
    session: LoadSession<B::Cursor>,
    state: LoaderState,
    summary: LoadSummary,
}

impl<R: Read, B: Backend> GeneralLoader<R, B> {
    pub fn new(input: R, backend: B, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader: ExactReader::with_limit(input, config.max_payload_size),
            backend,
            config,
            session: LoadSession::new(),
            state: LoaderState::AwaitingHeader,
            summary: LoadSummary::default(),
        })
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Bytes consumed from the input so far
    pub fn bytes_consumed(&self) -> u64 {
        self.reader.bytes_consumed()
    }

    /// Load one stream from the current input position
    ///
    /// Any state left from a previous run is released first, so a source
    /// holding several concatenated streams can be loaded by calling `run`
    /// repeatedly. On failure every cursor is released and, unless disabled
    /// in the config, the partially built database is removed.
    pub fn run(&mut self) -> Result<LoadSummary> {
        self.release_session();
        self.reader.reset_offset();
        self.summary = LoadSummary::default();
        self.state = LoaderState::AwaitingHeader;

        match self.load() {
            Ok(()) => {
                self.state = LoaderState::Closed;
                self.summary.bytes_read = self.reader.bytes_consumed();
                tracing::info!(
                    "Load complete: {} events, {} tables, {} columns, {} rows, {} bytes",
                    self.summary.events,
                    self.summary.tables,
                    self.summary.columns,
                    self.summary.rows,
                    self.summary.bytes_read
                );
                Ok(self.summary.clone())
            }
            Err(e) => {
                self.state = LoaderState::Failed;
                tracing::error!("Load failed: {}", e);
                self.clean_up();
                Err(e)
            }
        }
    }

    fn load(&mut self) -> Result<()> {
        let header = StreamHeader::read_from(&mut self.reader)?;
        tracing::debug!(
            version = header.version,
            header_size = header.header_size,
            "stream header accepted"
        );
        self.state = LoaderState::Idle;
        self.read_events()
    }

    fn read_events(&mut self) -> Result<()> {
        loop {
            let offset = self.reader.bytes_consumed();
            self.reader
                .align(self.config.alignment)
                .map_err(|e| LoaderError::at_offset(offset, e))?;

            let offset = self.reader.bytes_consumed();
            let raw = self
                .reader
                .read_u32()
                .map_err(|e| LoaderError::at_offset(offset, e))?;
            let header = EventHeader::decode(raw, offset).inspect_err(|e| {
                tracing::error!("{}", e);
            })?;
            self.summary.events += 1;

            let flow = self
                .dispatch(header)
                .map_err(|e| LoaderError::in_event(header.kind, header.id, offset, e))?;
            if flow == Flow::Finished {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, header: EventHeader) -> Result<Flow> {
        match header.kind {
            EventKind::UseSchema => self.use_schema()?,
            EventKind::RemotePath => self.remote_path()?,
            EventKind::NewTable => self.new_table(header)?,
            EventKind::NewColumn => self.new_column(header)?,
            EventKind::CellData => self.cell(header, CellTarget::Row)?,
            EventKind::CellDefault => self.cell(header, CellTarget::Default)?,
            EventKind::OpenStream => self.open_stream()?,
            EventKind::NextRow => self.next_row(header)?,
            EventKind::EndStream => {
                self.end_stream()?;
                return Ok(Flow::Finished);
            }
            EventKind::ErrorMessage => return Err(self.error_message()),
        }
        Ok(Flow::Continue)
    }

    // =========================================================================
    // Event Handlers
    // =========================================================================

    fn use_schema(&mut self) -> Result<()> {
        tracing::info!("event: Use-Schema");
        if self.session.schema.is_some() {
            return Err(LoaderError::SchemaAlreadySet);
        }

        let content_len = self.reader.read_u32()?;
        let name_len = self.reader.read_u32()?;
        let bytes = self
            .reader
            .read_exact(content_len as u64 + name_len as u64)?;
        let (content, name) = bytes.split_at(content_len as usize);
        let content =
            std::str::from_utf8(content).map_err(|_| LoaderError::InvalidText("schema content"))?;
        let name = std::str::from_utf8(name).map_err(|_| LoaderError::InvalidText("schema name"))?;

        tracing::info!(
            "schema name '{}', {} bytes of inline schema",
            name,
            content.len()
        );
        self.backend.compile_schema(content, name)?;
        self.session.schema = Some(SchemaContext {
            name: name.to_string(),
        });
        Ok(())
    }

    fn remote_path(&mut self) -> Result<()> {
        tracing::info!("event: Remote-Path");
        let schema = self.session.schema.as_ref().ok_or(LoaderError::SchemaNotSet)?;
        if self.session.database.is_some() {
            return Err(LoaderError::DatabaseAlreadySet);
        }

        let path = self.reader.read_prefixed_str("database path")?;
        tracing::debug!("creating database '{}' with schema '{}'", path, schema.name);
        self.backend.open_or_create_database(path)?;
        self.session.database = Some(path.to_string());
        Ok(())
    }

    fn new_table(&mut self, header: EventHeader) -> Result<()> {
        let id = header.table_id();
        tracing::info!("event: New-Table, id={}", id);
        if self.session.registry.contains_table(id) {
            return Err(LoaderError::TableExists(id));
        }
        if self.session.database.is_none() {
            return Err(LoaderError::DatabaseNotSet);
        }

        let name = self.reader.read_prefixed_str("table name")?;
        tracing::debug!("adding table '{}'", name);
        let cursor = self.backend.create_table_cursor(name)?;

        let index = self.session.cursors.len();
        self.session.cursors.push(CursorSlot {
            table: id,
            name: name.to_string(),
            cursor,
            opened: false,
        });
        self.session.registry.insert_table(id, index)?;
        self.summary.tables += 1;

        // Cursors created mid-stream are opened on first use
        if self.session.stream_open {
            tracing::debug!("table {} created after Open-Stream, opening lazily", id);
        }
        Ok(())
    }

    fn new_column(&mut self, header: EventHeader) -> Result<()> {
        let id = header.column_id();
        tracing::info!("event: New-Column, id={}", id);

        let table = TableId(self.reader.read_u32()?);
        let cursor_idx = self
            .session
            .registry
            .table(table)
            .ok_or(LoaderError::TableNotFound(table))?;
        if self.session.registry.contains_column(id) {
            return Err(LoaderError::ColumnExists(id));
        }
        if self.session.cursors[cursor_idx].opened {
            return Err(LoaderError::CursorAlreadyOpen(table));
        }

        let elem_bits = self.reader.read_u32()?;
        if elem_bits == 0 {
            return Err(LoaderError::InvalidElementWidth(elem_bits));
        }
        let name = self.reader.read_prefixed_str("column name")?;

        let slot = &mut self.session.cursors[cursor_idx];
        let handle = self.backend.add_column(&mut slot.cursor, name, elem_bits)?;
        tracing::debug!(
            "tableId = {}, added column '{}', columnIdx = {}, elemBits = {}",
            table,
            name,
            handle.0,
            elem_bits
        );

        self.session.registry.insert_column(
            id,
            ColumnEntry {
                cursor: cursor_idx,
                handle,
                elem_bits,
            },
        )?;
        self.summary.columns += 1;
        Ok(())
    }

    /// Shared by Cell-Data and Cell-Default
    fn cell(&mut self, header: EventHeader, target: CellTarget) -> Result<()> {
        let id = header.column_id();
        let entry = self
            .session
            .registry
            .column(id)
            .ok_or(LoaderError::ColumnNotFound(id))?;
        if target == CellTarget::Row && !self.session.stream_open {
            return Err(LoaderError::StreamNotOpen);
        }

        let count = self.reader.read_u32()?;
        tracing::debug!(
            "event: {:?} cell, column={}, columnIdx = {}, elem size={} bits, elem count={}",
            target,
            id,
            entry.handle.0,
            entry.elem_bits,
            count
        );
        let data = self.reader.read_exact(payload_len(entry.elem_bits, count))?;

        let slot = &mut self.session.cursors[entry.cursor];
        match target {
            CellTarget::Row => {
                open_slot(&mut self.backend, slot)?;
                self.backend
                    .write_cell(&mut slot.cursor, entry.handle, entry.elem_bits, data, count)?;
                self.summary.cells += 1;
            }
            CellTarget::Default => {
                self.backend
                    .write_default(&mut slot.cursor, entry.handle, entry.elem_bits, data, count)?;
                self.summary.defaults += 1;
            }
        }
        Ok(())
    }

    fn open_stream(&mut self) -> Result<()> {
        tracing::info!("event: Open-Stream");
        if self.session.stream_open {
            return Err(LoaderError::StreamAlreadyOpen);
        }
        for slot in &mut self.session.cursors {
            open_slot(&mut self.backend, slot)?;
        }
        self.session.stream_open = true;
        self.state = LoaderState::Streaming;
        Ok(())
    }

    fn next_row(&mut self, header: EventHeader) -> Result<()> {
        let id = header.table_id();
        tracing::debug!("event: Next-Row, id={}", id);
        let cursor_idx = self
            .session
            .registry
            .table(id)
            .ok_or(LoaderError::TableNotFound(id))?;
        if !self.session.stream_open {
            return Err(LoaderError::StreamNotOpen);
        }

        let slot = &mut self.session.cursors[cursor_idx];
        open_slot(&mut self.backend, slot)?;
        self.backend.commit_row(&mut slot.cursor)?;
        self.backend.close_row(&mut slot.cursor)?;
        self.backend.open_row(&mut slot.cursor)?;
        self.summary.rows += 1;
        Ok(())
    }

    fn end_stream(&mut self) -> Result<()> {
        tracing::info!("event: End-Stream");
        let mut slots = std::mem::take(&mut self.session.cursors).into_iter();
        while let Some(mut slot) = slots.next() {
            let finished = finish_slot(&mut self.backend, &mut slot);
            let released = self.backend.release_cursor(slot.cursor);
            if let Err(e) = finished.and(released) {
                // Whatever is left gets released by the failure cleanup
                self.session.cursors.extend(slots);
                return Err(e);
            }
        }
        self.session.registry.clear();
        self.session.stream_open = false;
        Ok(())
    }

    fn error_message(&mut self) -> LoaderError {
        tracing::info!("event: Error-Message");
        match self.reader.read_prefixed() {
            Ok(bytes) => {
                let message = String::from_utf8_lossy(bytes).into_owned();
                tracing::error!("Error-Message [{}] = \"{}\"", bytes.len(), message);
                LoaderError::ProducerError(message)
            }
            Err(e) => e,
        }
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Release every cursor and drop all session state
    fn release_session(&mut self) {
        for slot in self.session.cursors.drain(..) {
            if let Err(e) = self.backend.release_cursor(slot.cursor) {
                tracing::warn!("Failed to release cursor of table '{}': {}", slot.name, e);
            }
        }
        self.session = LoadSession::new();
    }

    fn clean_up(&mut self) {
        let database = self.session.database.take();
        self.release_session();

        let Some(path) = database else {
            return;
        };
        if !self.config.remove_on_failure {
            tracing::info!("Keeping partially built database '{}'", path);
            return;
        }
        tracing::info!("Removing partially built database '{}'", path);
        if let Err(e) = self.backend.remove_database(&path) {
            tracing::warn!("Failed to remove database '{}': {}", path, e);
        }
    }
}

/// Open a cursor and its first row, once
fn open_slot<B: Backend>(backend: &mut B, slot: &mut CursorSlot<B::Cursor>) -> Result<()> {
    if slot.opened {
        return Ok(());
    }
    backend.open_cursor(&mut slot.cursor)?;
    slot.opened = true;
    backend.open_row(&mut slot.cursor)
}

/// Close the pending row and commit a cursor's table
fn finish_slot<B: Backend>(backend: &mut B, slot: &mut CursorSlot<B::Cursor>) -> Result<()> {
    if !slot.opened {
        tracing::debug!(
            "table {} '{}' was never opened, releasing only",
            slot.table,
            slot.name
        );
        return Ok(());
    }
    backend.close_row(&mut slot.cursor)?;
    backend.commit_cursor(&mut slot.cursor)?;
    backend.reindex_parent(&mut slot.cursor)
}

/// Load a single stream with a fresh loader
pub fn load<R: Read, B: Backend>(input: R, backend: B, config: Config) -> Result<LoadSummary> {
    GeneralLoader::new(input, backend, config)?.run()
}
