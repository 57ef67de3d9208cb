use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{BufWriter, Read, Write};

use super::scan::TokenScanner;
use crate::cancel::Cancel;
use crate::error::{Result, SortError};
use crate::sort::DELIMITER;

const MERGE_BUF_SIZE: usize = 4 * 1024 * 1024;

/// One heap element: the current token of one source stream.
/// Derived ordering compares the token bytes first and breaks ties by
/// source index, keeping the heap order total.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct MergeStep {
    token: Vec<u8>,
    source: usize,
}

/// K-way merge: read N byte-sorted token streams and write their merged
/// ordering to `out`, one token per line.
///
/// Each step pops the smallest current token across all sources, writes
/// it, and refills from the source it came from. Cancellation stops the
/// merge cleanly (Ok, partial output); write and scan errors return
/// immediately.
pub fn merge<R: Read, W: Write>(cancel: &Cancel, sources: Vec<R>, out: W) -> Result<()> {
    let mut writer = BufWriter::with_capacity(MERGE_BUF_SIZE, out);

    let mut scanners: Vec<TokenScanner<R>> =
        sources.into_iter().map(TokenScanner::new).collect();

    let mut heap = BinaryHeap::with_capacity(scanners.len());
    for (source, scanner) in scanners.iter_mut().enumerate() {
        if cancel.is_cancelled() {
            return Ok(());
        }
        if let Some(token) = next_token(scanner)? {
            heap.push(Reverse(MergeStep { token, source }));
        }
    }

    while let Some(Reverse(step)) = heap.pop() {
        if cancel.is_cancelled() {
            return Ok(());
        }

        writer
            .write_all(&step.token)
            .map_err(|e| SortError::io("write output", e))?;
        writer
            .write_all(&[DELIMITER])
            .map_err(|e| SortError::io("write output", e))?;

        if let Some(token) = next_token(&mut scanners[step.source])? {
            heap.push(Reverse(MergeStep {
                token,
                source: step.source,
            }));
        }
    }

    writer.flush().map_err(|e| SortError::io("flush output", e))
}

fn next_token<R: Read>(scanner: &mut TokenScanner<R>) -> Result<Option<Vec<u8>>> {
    scanner
        .next_token()
        .map_err(|e| SortError::io("read merge source", e))
}
