//! Tests for ExactReader
//!
//! These tests verify:
//! - Exact reads and short-read failures
//! - Scratch buffer growth
//! - Cumulative alignment
//! - Payload size limits

use std::io::{Cursor, ErrorKind as IoErrorKind};

use genloader::protocol::ExactReader;
use genloader::{ErrorKind, LoaderError};

fn reader(len: usize) -> ExactReader<Cursor<Vec<u8>>> {
    ExactReader::new(Cursor::new((0..len).map(|i| i as u8).collect()))
}

// =============================================================================
// Exact Reads
// =============================================================================

#[test]
fn test_read_exact_returns_requested_bytes() {
    let mut reader = reader(10);

    assert_eq!(reader.read_exact(3).unwrap(), &[0, 1, 2]);
    assert_eq!(reader.read_exact(2).unwrap(), &[3, 4]);
    assert_eq!(reader.bytes_consumed(), 5);
}

#[test]
fn test_short_read_is_io_error() {
    let mut reader = reader(4);

    let err = reader.read_exact(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    match err {
        LoaderError::Io(e) => assert_eq!(e.kind(), IoErrorKind::UnexpectedEof),
        other => panic!("Expected IO error, got {:?}", other),
    }
}

#[test]
fn test_zero_length_read() {
    let mut reader = reader(0);

    assert!(reader.read_exact(0).unwrap().is_empty());
    assert_eq!(reader.bytes_consumed(), 0);
}

#[test]
fn test_scratch_buffer_never_shrinks() {
    let mut reader = reader(200);

    reader.read_exact(100).unwrap();
    assert_eq!(reader.scratch_len(), 100);

    assert_eq!(reader.read_exact(10).unwrap().len(), 10);
    assert_eq!(reader.scratch_len(), 100);

    reader.read_exact(90).unwrap();
    assert_eq!(reader.scratch_len(), 100);
}

#[test]
fn test_read_u32_native_endian() {
    let bytes = 0xDEAD_BEEFu32.to_ne_bytes().to_vec();
    let mut reader = ExactReader::new(Cursor::new(bytes));

    assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(reader.bytes_consumed(), 4);
}

#[test]
fn test_read_prefixed() {
    let mut bytes = 5u32.to_ne_bytes().to_vec();
    bytes.extend_from_slice(b"hello world");
    let mut reader = ExactReader::new(Cursor::new(bytes));

    assert_eq!(reader.read_prefixed().unwrap(), b"hello");
    assert_eq!(reader.bytes_consumed(), 9);
}

#[test]
fn test_read_prefixed_str_rejects_invalid_utf8() {
    let mut bytes = 2u32.to_ne_bytes().to_vec();
    bytes.extend_from_slice(&[0xFF, 0xFE]);
    let mut reader = ExactReader::new(Cursor::new(bytes));

    let err = reader.read_prefixed_str("table name").unwrap_err();
    assert!(matches!(err, LoaderError::InvalidText("table name")));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

// =============================================================================
// Alignment
// =============================================================================

#[test]
fn test_align_discards_padding_from_offset_13() {
    let mut reader = reader(20);

    reader.read_exact(13).unwrap();
    assert_eq!(reader.align(4).unwrap(), 3);
    assert_eq!(reader.bytes_consumed(), 16);

    // Next read starts right after the padding
    assert_eq!(reader.read_exact(1).unwrap(), &[16]);
}

#[test]
fn test_align_noop_when_aligned() {
    let mut reader = reader(16);

    reader.read_exact(8).unwrap();
    assert_eq!(reader.align(4).unwrap(), 0);
    assert_eq!(reader.bytes_consumed(), 8);
}

#[test]
fn test_align_is_cumulative_across_reads() {
    let mut reader = reader(16);

    reader.read_exact(5).unwrap();
    reader.read_exact(6).unwrap();
    assert_eq!(reader.align(4).unwrap(), 1);
    assert_eq!(reader.bytes_consumed(), 12);
}

#[test]
fn test_align_wider_boundary() {
    let mut reader = reader(16);

    reader.read_u32().unwrap();
    assert_eq!(reader.align(8).unwrap(), 4);
    assert_eq!(reader.bytes_consumed(), 8);
}

#[test]
fn test_align_past_end_is_io_error() {
    let mut reader = reader(14);

    reader.read_exact(13).unwrap();
    let err = reader.align(4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_skip_counts_bytes() {
    let mut reader = reader(10);

    reader.skip(7).unwrap();
    assert_eq!(reader.bytes_consumed(), 7);
    assert_eq!(reader.read_exact(1).unwrap(), &[7]);
}

// =============================================================================
// Limits
// =============================================================================

#[test]
fn test_payload_limit_enforced() {
    let mut reader = ExactReader::with_limit(Cursor::new(vec![0u8; 64]), 8);

    assert!(reader.read_exact(8).is_ok());
    let err = reader.read_exact(9).unwrap_err();
    assert!(matches!(err, LoaderError::PayloadTooLarge { size: 9, max: 8 }));
    assert_eq!(err.kind(), ErrorKind::Format);

    // Nothing was consumed by the refused read
    assert_eq!(reader.bytes_consumed(), 8);
    assert_eq!(reader.scratch_len(), 8);
}
