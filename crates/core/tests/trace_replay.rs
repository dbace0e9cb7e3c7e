//! Trace-file reader tests.

use std::io::Write;

use ooosim_core::sim::trace::{TraceAccess, TraceError, read_trace_file};
use tempfile::NamedTempFile;

fn write_trace(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write trace");
    file
}

#[test]
fn test_reads_records() {
    let file = write_trace("0,400000,R,1000\n1,400004,W,2000\n");
    let records = read_trace_file(file.path()).unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].thread_id, 0);
    assert_eq!(records[0].pc, 0x400000);
    assert_eq!(records[0].access, TraceAccess::Read);
    assert_eq!(records[0].effective_address, 0x1000);

    assert_eq!(records[1].thread_id, 1);
    assert_eq!(records[1].access, TraceAccess::Write);
    assert_eq!(records[1].effective_address, 0x2000);
}

#[test]
fn test_empty_first_field_skips_record() {
    let file = write_trace(",ignored,R,1000\n2,400008,R,3000\n");
    let records = read_trace_file(file.path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].thread_id, 2);
}

#[test]
fn test_blank_lines_are_skipped() {
    let file = write_trace("\n\n3,400000,W,4000\n");
    let records = read_trace_file(file.path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].thread_id, 3);
}

#[test]
fn test_bad_access_field_is_an_error() {
    let file = write_trace("0,400000,X,1000\n");
    let err = read_trace_file(file.path()).unwrap_err();
    assert!(matches!(err, TraceError::Parse { line: 1, .. }), "{err}");
}

#[test]
fn test_bad_hex_field_is_an_error() {
    let file = write_trace("0,zzzz,R,1000\n");
    let err = read_trace_file(file.path()).unwrap_err();
    assert!(matches!(err, TraceError::Parse { line: 1, .. }), "{err}");
}

#[test]
fn test_wrong_field_count_is_an_error() {
    let file = write_trace("0,400000,R\n");
    let err = read_trace_file(file.path()).unwrap_err();
    assert!(matches!(err, TraceError::Parse { line: 1, .. }), "{err}");
}

#[test]
fn test_missing_file_is_io_error() {
    let err = read_trace_file(std::path::Path::new("/nonexistent/trace.txt")).unwrap_err();
    assert!(matches!(err, TraceError::Io(_)));
}

#[test]
fn test_whitespace_around_fields_is_tolerated() {
    let file = write_trace(" 1 , 400000 , R , 1000 \n");
    let records = read_trace_file(file.path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].thread_id, 1);
    assert_eq!(records[0].effective_address, 0x1000);
}
