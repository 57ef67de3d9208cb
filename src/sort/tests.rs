use std::io::Cursor;

use super::buffer::{Buffer, MAX_BUFFER_SIZE};
use super::core::{parse_buffer_size, run, Input, SortConfig};
use super::index::Entry;
use crate::cancel::Cancel;
use crate::error::SortError;

fn fill_str(input: &str, size: usize) -> (Buffer, Vec<u8>) {
    Buffer::fill(Cursor::new(input.as_bytes().to_vec()), size).unwrap()
}

fn sorted_tokens(input: &str, size: usize, parallel: usize) -> Vec<Vec<u8>> {
    let (mut buffer, _) = fill_str(input, size);
    buffer.sort(parallel).map(|t| t.to_vec()).collect()
}

fn as_tokens(strs: &[&str]) -> Vec<Vec<u8>> {
    strs.iter().map(|s| s.as_bytes().to_vec()).collect()
}

#[test]
fn test_entry_roundtrip() {
    let e = Entry::new(7, 42);
    assert_eq!(e.offset(), 7);
    assert_eq!(e.len(), 42);

    let e = Entry::new(u32::MAX, 1);
    assert_eq!(e.offset(), u32::MAX);
    assert_eq!(e.len(), 1);
}

#[test]
fn test_entry_bytes() {
    let data = b"abc\ndef\n";
    assert_eq!(Entry::new(0, 4).bytes(data), b"abc\n");
    assert_eq!(Entry::new(4, 4).bytes(data), b"def\n");
}

#[test]
fn test_fill_partial_token_read() {
    let input = "a\nb\nc\n123...";
    let (buffer, trimmed) = fill_str(input, input.len());
    assert_eq!(trimmed, b"123...");
    assert_eq!(buffer.populated(), b"a\nb\nc\n");
    assert_eq!(buffer.token_count(), 3);
}

#[test]
fn test_fill_no_token_delimiter() {
    // A full buffer with no newline: one token bigger than the buffer.
    let err = Buffer::fill(Cursor::new(&b"0123456789..."[..]), 6).unwrap_err();
    assert!(matches!(err, SortError::DelimiterNotFound));
}

#[test]
fn test_fill_size_too_big() {
    let err = Buffer::fill(Cursor::new(&b"a\n"[..]), MAX_BUFFER_SIZE + 1).unwrap_err();
    assert!(matches!(err, SortError::BufferSizeTooBig(_)));
}

#[test]
fn test_fill_empty_line() {
    let (buffer, trimmed) = fill_str("\n", 1024);
    assert!(trimmed.is_empty());
    assert_eq!(buffer.token_count(), 1);
}

#[test]
fn test_fill_empty_input() {
    let (buffer, trimmed) = fill_str("", 1024);
    assert!(trimmed.is_empty());
    assert_eq!(buffer.token_count(), 0);
    assert!(buffer.populated().is_empty());
}

#[test]
fn test_fill_index_covers_prefix_exactly() {
    let input = "foo\n\nbar\nlonger line\nx\n";
    let (mut buffer, trimmed) = fill_str(input, input.len());
    assert!(trimmed.is_empty());

    // Entries read in order reconstruct the populated prefix with no
    // gaps or overlaps; sorting only permutes them.
    let total: usize = buffer.sort(1).map(|t| t.len()).sum();
    assert_eq!(total, input.len());
}

#[test]
fn test_sort_one_partition() {
    let input = "i\nh\ng\nf\ne\nd\nc\nb\na\n";
    let expected = as_tokens(&[
        "a\n", "b\n", "c\n", "d\n", "e\n", "f\n", "g\n", "h\n", "i\n",
    ]);
    assert_eq!(sorted_tokens(input, input.len(), 1), expected);
}

#[test]
fn test_sort_two_partitions() {
    let input = "i\nh\ng\nf\ne\nd\nc\nb\na\n";
    let expected = as_tokens(&[
        "a\n", "b\n", "c\n", "d\n", "e\n", "f\n", "g\n", "h\n", "i\n",
    ]);
    assert_eq!(sorted_tokens(input, input.len(), 2), expected);
}

#[test]
fn test_sort_parallel_clamped() {
    // 0, more-than-tokens and more-than-max all collapse to the same
    // ascending output.
    let input = "i\nh\ng\nf\ne\nd\nc\nb\na\n";
    let expected = sorted_tokens(input, input.len(), 1);
    assert_eq!(sorted_tokens(input, input.len(), 0), expected);
    assert_eq!(sorted_tokens(input, input.len(), 18), expected);
    assert_eq!(sorted_tokens(input, input.len(), 100), expected);
}

#[test]
fn test_sort_buffer_smaller_than_input() {
    // Only the first buffer-full is indexed; the rest stays unread.
    let input = "a\nb\nc\na\nb\nc\na\nb\nc\n";
    let expected = as_tokens(&["a\n", "b\n", "c\n"]);
    assert_eq!(sorted_tokens(input, input.len() / 3, 1), expected);
}

#[test]
fn test_sort_partial_token_not_sorted() {
    let input = "c\nb\na\n123...";
    let expected = as_tokens(&["a\n", "b\n", "c\n"]);
    assert_eq!(sorted_tokens(input, input.len(), 2), expected);
}

#[test]
fn test_sort_empty_lines() {
    let input = "\n\n\n";
    let expected = as_tokens(&["\n", "\n", "\n"]);
    assert_eq!(sorted_tokens(input, input.len(), 2), expected);
}

#[test]
fn test_sort_prefix_orders_first() {
    // "a\n" < "ab\n": the delimiter byte is smaller than any following
    // payload byte, so a token sorts before its strict extensions.
    let input = "ab\nb\na\n";
    let expected = as_tokens(&["a\n", "ab\n", "b\n"]);
    assert_eq!(sorted_tokens(input, input.len(), 1), expected);
}

#[test]
fn test_sort_idempotent() {
    let input = "i\nh\ng\nf\ne\nd\nc\nb\na\n";
    let once: Vec<u8> = sorted_tokens(input, input.len(), 2).concat();
    let twice: Vec<u8> =
        sorted_tokens(std::str::from_utf8(&once).unwrap(), once.len(), 2).concat();
    assert_eq!(once, twice);
}

fn run_sort(inputs: &[&str], config: &SortConfig) -> Vec<u8> {
    let readers: Vec<Input> = inputs
        .iter()
        .map(|s| Box::new(Cursor::new(s.as_bytes().to_vec())) as Input)
        .collect();
    let mut out = Vec::new();
    run(config, readers, &mut out, &Cancel::new()).unwrap();
    out
}

#[test]
fn test_run_in_memory() {
    let config = SortConfig::for_buffer(1024, 2);
    let out = run_sort(&["i\nh\ng\nf\ne\nd\nc\nb\na\n"], &config);
    assert_eq!(out, b"a\nb\nc\nd\ne\nf\ng\nh\ni\n");
}

#[test]
fn test_run_external() {
    let dir = tempfile::tempdir().unwrap();
    let input = "a\nb\nc\na\nb\nc\na\nb\nc\n";

    // A buffer one third of the input forces the external pipeline.
    let mut config = SortConfig::for_buffer(input.len() / 3, 2);
    config.temp_dir = dir.path().to_path_buf();

    let out = run_sort(&[input], &config);
    assert_eq!(out, b"a\na\na\nb\nb\nb\nc\nc\nc\n");

    // Run files are deleted after the merge.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_run_no_trailing_newline() {
    let config = SortConfig::for_buffer(1024, 1);
    let out = run_sort(&["b\na"], &config);
    assert_eq!(out, b"a\nb\n");
}

#[test]
fn test_run_empty_input() {
    let config = SortConfig::for_buffer(1024, 1);
    let out = run_sort(&[""], &config);
    assert!(out.is_empty());
}

#[test]
fn test_run_newlines_only() {
    let config = SortConfig::for_buffer(1024, 2);
    let out = run_sort(&["\n\n\n"], &config);
    assert_eq!(out, b"\n\n\n");
}

#[test]
fn test_run_multiple_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SortConfig::for_buffer(1024, 2);
    config.temp_dir = dir.path().to_path_buf();

    // More than one input goes through the external pipeline; a missing
    // trailing newline stays a token boundary between readers.
    let out = run_sort(&["banana\napple", "cherry\nzebra\n"], &config);
    assert_eq!(out, b"apple\nbanana\ncherry\nzebra\n");
}

#[test]
fn test_run_cancelled_before_start() {
    let config = SortConfig::for_buffer(1024, 2);
    let cancel = Cancel::new();
    cancel.cancel();

    let mut out = Vec::new();
    let readers: Vec<Input> = vec![Box::new(Cursor::new(b"b\na\n".to_vec()))];
    run(&config, readers, &mut out, &cancel).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_parse_buffer_size() {
    assert_eq!(parse_buffer_size("1024").unwrap(), 1024);
    assert_eq!(parse_buffer_size("10K").unwrap(), 10 * 1024);
    assert_eq!(parse_buffer_size("64M").unwrap(), 64 * 1024 * 1024);
    assert_eq!(parse_buffer_size("1G").unwrap(), 1024 * 1024 * 1024);
    assert_eq!(parse_buffer_size("2b").unwrap(), 1024);
    assert!(parse_buffer_size("").is_err());
    assert!(parse_buffer_size("10X").is_err());
    assert!(parse_buffer_size("abc").is_err());
}
