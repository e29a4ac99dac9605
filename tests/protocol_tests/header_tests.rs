//! Tests for StreamHeader
//!
//! These tests verify:
//! - Acceptance of a well-formed header
//! - Each rejection in the validation table, in order
//! - Skipping of header extensions

use std::io::Cursor;

use genloader::protocol::{
    ExactReader, StreamHeader, CURRENT_VERSION, HEADER_SIZE, REVERSE_ENDIAN, SIGNATURE,
};
use genloader::{ErrorKind, LoaderError};

// =============================================================================
// Helper Functions
// =============================================================================

fn read(header: &StreamHeader, trailing: &[u8]) -> (Result<StreamHeader, LoaderError>, u64) {
    let mut bytes = header.encode().to_vec();
    bytes.extend_from_slice(trailing);
    let mut reader = ExactReader::new(Cursor::new(bytes));
    let result = StreamHeader::read_from(&mut reader);
    (result, reader.bytes_consumed())
}

// =============================================================================
// Accepted Headers
// =============================================================================

#[test]
fn test_default_header_accepted() {
    let header = StreamHeader::default();
    let (result, consumed) = read(&header, &[]);

    assert_eq!(result.unwrap(), header);
    assert_eq!(consumed, HEADER_SIZE as u64);
}

#[test]
fn test_header_extension_skipped() {
    let header = StreamHeader {
        header_size: HEADER_SIZE as u32 + 8,
        ..StreamHeader::default()
    };
    let (result, consumed) = read(&header, &[0xAA; 12]);

    assert!(result.is_ok());
    assert_eq!(consumed, HEADER_SIZE as u64 + 8);
}

#[test]
fn test_encode_layout() {
    let bytes = StreamHeader::default().encode();

    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(&bytes[0..8], SIGNATURE);
    assert_eq!(&bytes[8..12], &1u32.to_ne_bytes());
    assert_eq!(&bytes[12..16], &CURRENT_VERSION.to_ne_bytes());
}

// =============================================================================
// Rejected Headers
// =============================================================================

#[test]
fn test_bad_signature() {
    let header = StreamHeader {
        signature: *b"NCBIxxxx",
        ..StreamHeader::default()
    };
    let err = read(&header, &[]).0.unwrap_err();

    assert!(matches!(err, LoaderError::BadSignature(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_reverse_endian_rejected_without_further_reads() {
    let header = StreamHeader {
        endian: REVERSE_ENDIAN,
        ..StreamHeader::default()
    };
    let (result, consumed) = read(&header, &[0u8; 64]);

    assert!(matches!(result.unwrap_err(), LoaderError::ReverseEndian));
    assert_eq!(consumed, HEADER_SIZE as u64);
}

#[test]
fn test_invalid_endian() {
    let header = StreamHeader {
        endian: 7,
        ..StreamHeader::default()
    };
    let err = read(&header, &[]).0.unwrap_err();

    assert!(matches!(err, LoaderError::InvalidEndian(7)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_bad_version() {
    let header = StreamHeader {
        version: 2,
        ..StreamHeader::default()
    };
    let err = read(&header, &[]).0.unwrap_err();

    assert!(matches!(
        err,
        LoaderError::BadVersion { found: 2, expected: 1 }
    ));
}

#[test]
fn test_packed_rejected() {
    let header = StreamHeader {
        packing: 1,
        ..StreamHeader::default()
    };
    let err = read(&header, &[]).0.unwrap_err();

    assert!(matches!(err, LoaderError::PackedFormat));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_header_size_below_fixed_size() {
    let header = StreamHeader {
        header_size: 16,
        ..StreamHeader::default()
    };
    let err = read(&header, &[]).0.unwrap_err();

    assert!(matches!(err, LoaderError::MalformedHeader(_)));
}

#[test]
fn test_truncated_header_is_io_error() {
    let bytes = StreamHeader::default().encode()[..10].to_vec();
    let mut reader = ExactReader::new(Cursor::new(bytes));

    let err = StreamHeader::read_from(&mut reader).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_truncated_extension_is_io_error() {
    let header = StreamHeader {
        header_size: 64,
        ..StreamHeader::default()
    };
    let err = read(&header, &[0u8; 10]).0.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
}

// =============================================================================
// Check Order
// =============================================================================

#[test]
fn test_signature_checked_before_endianness() {
    let header = StreamHeader {
        signature: *b"XXXXXXXX",
        endian: REVERSE_ENDIAN,
        ..StreamHeader::default()
    };
    assert!(matches!(
        read(&header, &[]).0.unwrap_err(),
        LoaderError::BadSignature(_)
    ));
}

#[test]
fn test_endianness_checked_before_version() {
    let header = StreamHeader {
        endian: REVERSE_ENDIAN,
        version: 9,
        ..StreamHeader::default()
    };
    assert!(matches!(
        read(&header, &[]).0.unwrap_err(),
        LoaderError::ReverseEndian
    ));
}

#[test]
fn test_version_checked_before_packing() {
    let header = StreamHeader {
        version: 9,
        packing: 1,
        ..StreamHeader::default()
    };
    assert!(matches!(
        read(&header, &[]).0.unwrap_err(),
        LoaderError::BadVersion { .. }
    ));
}
