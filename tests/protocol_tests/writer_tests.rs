//! Tests for StreamWriter
//!
//! These tests verify:
//! - Event header encoding
//! - Alignment padding between events

use genloader::protocol::{
    ColumnId, EventHeader, EventKind, StreamWriter, TableId, HEADER_SIZE, MAX_ID,
};
use genloader::LoaderError;

use crate::common::stream;

fn word(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[test]
fn test_event_header_word() {
    let mut writer = stream();
    writer.new_table(TableId(5), "T").unwrap();
    let bytes = writer.into_inner();

    let header = EventHeader::decode(word(&bytes, HEADER_SIZE), 0).unwrap();
    assert_eq!(header.kind, EventKind::NewTable);
    assert_eq!(header.id, 5);
    assert_eq!(word(&bytes, HEADER_SIZE + 4), 1);
    assert_eq!(bytes[HEADER_SIZE + 8], b'T');
}

#[test]
fn test_events_padded_to_alignment() {
    let mut writer = stream();

    // 4 (header) + 4 (len) + 3 (name) = 11 bytes
    writer.new_table(TableId(1), "abc").unwrap();
    assert_eq!(writer.bytes_written(), HEADER_SIZE as u64 + 11);

    writer.next_row(TableId(1)).unwrap();
    assert_eq!(writer.bytes_written(), HEADER_SIZE as u64 + 12 + 4);

    let bytes = writer.into_inner();
    assert_eq!(bytes[HEADER_SIZE + 11], 0);
    let header = EventHeader::decode(word(&bytes, HEADER_SIZE + 12), 0).unwrap();
    assert_eq!(header.kind, EventKind::NextRow);
}

#[test]
fn test_new_column_payload_layout() {
    let mut writer = stream();
    writer.new_column(ColumnId(2), TableId(7), 16, "qual").unwrap();
    let bytes = writer.into_inner();

    let at = HEADER_SIZE + 4;
    assert_eq!(word(&bytes, at), 7);
    assert_eq!(word(&bytes, at + 4), 16);
    assert_eq!(word(&bytes, at + 8), 4);
    assert_eq!(&bytes[at + 12..at + 16], b"qual");
}

#[test]
fn test_id_out_of_range_rejected() {
    let mut writer = StreamWriter::new(Vec::new());

    let err = writer.new_table(TableId(MAX_ID + 1), "T").unwrap_err();
    assert!(matches!(err, LoaderError::IdOutOfRange(_)));
    assert_eq!(writer.bytes_written(), 0);
}
