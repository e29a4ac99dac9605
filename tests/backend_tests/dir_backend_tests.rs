//! Tests for the directory backend
//!
//! These tests verify:
//! - Database, table and column files are laid out as documented
//! - Column records carry row numbers and checksums
//! - Column defaults fill unwritten cells
//! - Schema resolution from inline text and external files
//! - Failed loads leave no partial database behind

use std::fs;
use std::io::Cursor;
use std::path::Path;

use genloader::backend::{ColumnMeta, NO_VALUE};
use genloader::protocol::{ColumnId, StreamWriter, TableId};
use genloader::{load, Config, DirBackend, ErrorKind, LoadSummary, LoaderError, Result};
use tempfile::TempDir;

use crate::common::{stream, stream_with_column, stream_with_database};

fn config_in(root: &Path) -> Config {
    Config::builder().output_root(root).build()
}

fn run_dir(writer: StreamWriter<Vec<u8>>, config: Config) -> Result<LoadSummary> {
    let backend = DirBackend::new(&config);
    load(Cursor::new(writer.into_inner()), backend, config)
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_full_load_layout() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_column();
    writer.new_column(ColumnId(2), TableId(1), 8, "flag").unwrap();
    writer.open_stream().unwrap();
    writer.cell_data(ColumnId(1), 1, &[1, 0, 0, 0]).unwrap();
    writer.cell_data(ColumnId(2), 1, &[1]).unwrap();
    writer.next_row(TableId(1)).unwrap();
    writer.cell_data(ColumnId(1), 1, &[2, 0, 0, 0]).unwrap();
    writer.next_row(TableId(1)).unwrap();
    writer.end_stream().unwrap();

    let summary = run_dir(writer, config_in(temp.path())).unwrap();
    assert_eq!(summary.rows, 2);

    let db = temp.path().join("out.db");
    assert_eq!(fs::read_to_string(db.join("schema.txt")).unwrap(), "schema text");

    let db_meta = DirBackend::load_database_meta(&db).unwrap();
    assert_eq!(db_meta.schema_name, "schemaName");
    assert_eq!(db_meta.schema_sources, vec!["<inline>".to_string()]);

    let table_dir = db.join("T");
    let meta = DirBackend::load_table_meta(&table_dir).unwrap();
    assert_eq!(meta.name, "T");
    assert_eq!(meta.rows, 2);
    assert_eq!(
        meta.columns,
        vec![
            ColumnMeta {
                name: "col".to_string(),
                elem_bits: 32,
                has_default: false,
            },
            ColumnMeta {
                name: "flag".to_string(),
                elem_bits: 8,
                has_default: false,
            },
        ]
    );

    let records = DirBackend::read_records(&table_dir.join("col.col")).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].row, 0);
    assert_eq!(records[0].data, vec![1, 0, 0, 0]);
    assert_eq!(records[1].row, 1);
    assert_eq!(records[1].data, vec![2, 0, 0, 0]);
    assert_eq!(records[1].elem_bits, 32);
    assert_eq!(records[1].count, 1);

    let flags = DirBackend::read_records(&table_dir.join("flag.col")).unwrap();
    assert_eq!(flags.len(), 1);

    let index = DirBackend::load_index(&table_dir).unwrap();
    assert_eq!(index.rows, 2);
    assert_eq!(
        index.columns,
        vec![
            ("col".to_string(), vec![0, 28]),
            ("flag".to_string(), vec![0, NO_VALUE]),
        ]
    );
}

#[test]
fn test_default_fills_unwritten_cells() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_database();
    writer.new_table(TableId(1), "T").unwrap();
    writer.new_column(ColumnId(1), TableId(1), 8, "c").unwrap();
    writer.cell_default(ColumnId(1), 1, &[9]).unwrap();
    writer.open_stream().unwrap();
    writer.cell_data(ColumnId(1), 1, &[1]).unwrap();
    writer.next_row(TableId(1)).unwrap();
    writer.next_row(TableId(1)).unwrap();
    writer.end_stream().unwrap();

    run_dir(writer, config_in(temp.path())).unwrap();

    let table_dir = temp.path().join("out.db").join("T");
    let records = DirBackend::read_records(&table_dir.join("c.col")).unwrap();
    let data: Vec<_> = records.iter().map(|r| r.data.clone()).collect();
    assert_eq!(data, vec![vec![1], vec![9]]);

    let default = DirBackend::read_records(&table_dir.join("c.default")).unwrap();
    assert_eq!(default[0].data, vec![9]);

    let index = DirBackend::load_index(&table_dir).unwrap();
    assert_eq!(index.columns, vec![("c".to_string(), vec![0, 25])]);
    assert!(DirBackend::load_table_meta(&table_dir).unwrap().columns[0].has_default);
}

#[test]
fn test_corrupted_record_detected() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_column();
    writer.open_stream().unwrap();
    writer.cell_data(ColumnId(1), 1, &[1, 2, 3, 4]).unwrap();
    writer.next_row(TableId(1)).unwrap();
    writer.end_stream().unwrap();
    run_dir(writer, config_in(temp.path())).unwrap();

    let path = temp.path().join("out.db").join("T").join("col.col");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = DirBackend::read_records(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

// =============================================================================
// Schema Resolution
// =============================================================================

#[test]
fn test_missing_schema_rejected() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream();
    writer.use_schema("", "nowhere").unwrap();
    writer.end_stream().unwrap();

    let err = run_dir(writer, config_in(temp.path())).unwrap_err();
    assert!(matches!(
        err.root(),
        LoaderError::SchemaNotFound(name) if name == "nowhere"
    ));
}

#[test]
fn test_external_schema_file() {
    let temp = TempDir::new().unwrap();
    let schema_path = temp.path().join("test.vschema");
    fs::write(&schema_path, "external text").unwrap();
    let missing = temp.path().join("missing.vschema");

    let config = Config::builder()
        .output_root(temp.path())
        .schema_file(&format!("{}:{}", missing.display(), schema_path.display()))
        .build();

    let mut writer = stream();
    writer.use_schema("", "external").unwrap();
    writer.remote_path("ext.db").unwrap();
    writer.end_stream().unwrap();
    run_dir(writer, config).unwrap();

    let db = temp.path().join("ext.db");
    assert_eq!(fs::read_to_string(db.join("schema.txt")).unwrap(), "external text");
    let meta = DirBackend::load_database_meta(&db).unwrap();
    assert_eq!(meta.schema_sources, vec![schema_path.display().to_string()]);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_existing_database_left_untouched() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("out.db");
    fs::create_dir(&db).unwrap();
    fs::write(db.join("keep"), "data").unwrap();

    let mut writer = stream_with_database();
    writer.end_stream().unwrap();

    let err = run_dir(writer, config_in(temp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert!(db.join("keep").exists());
}

#[test]
fn test_failure_removes_database() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_column();
    writer.open_stream().unwrap();
    writer.error_message("producer failed").unwrap();

    let err = run_dir(writer, config_in(temp.path())).unwrap_err();
    assert!(matches!(err.root(), LoaderError::ProducerError(_)));
    assert!(!temp.path().join("out.db").exists());
}

#[test]
fn test_keep_on_failure() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_column();
    writer.error_message("producer failed").unwrap();

    let config = Config::builder()
        .output_root(temp.path())
        .remove_on_failure(false)
        .build();
    assert!(run_dir(writer, config).is_err());
    assert!(temp.path().join("out.db").join("T").is_dir());
}

#[test]
fn test_unreadable_schema_file_is_backend_error() {
    let temp = TempDir::new().unwrap();
    let schema_dir = temp.path().join("schema.vschema");
    fs::create_dir(&schema_dir).unwrap();

    let config = Config::builder()
        .output_root(temp.path())
        .schema_file(&schema_dir.display().to_string())
        .build();

    let mut writer = stream();
    writer.use_schema("", "external").unwrap();
    writer.end_stream().unwrap();

    let err = run_dir(writer, config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

#[test]
fn test_database_path_on_regular_file_is_backend_error() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("out.db");
    fs::write(&target, "not a directory").unwrap();

    let mut writer = stream_with_database();
    writer.end_stream().unwrap();

    let err = run_dir(writer, config_in(temp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(fs::read_to_string(&target).unwrap(), "not a directory");
}

#[test]
fn test_invalid_table_name() {
    let temp = TempDir::new().unwrap();

    let mut writer = stream_with_database();
    writer.new_table(TableId(1), "../x").unwrap();

    let err = run_dir(writer, config_in(temp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
    assert!(!temp.path().join("x").exists());
    assert!(!temp.path().join("out.db").exists());
}
