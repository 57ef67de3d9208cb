/// In-memory sort engine: a single fixed-size byte buffer plus a packed
/// token index. Sorting permutes index entries, never token bytes, so the
/// byte storage stays read-only under all partition workers and the
/// partitions can be sorted without locks.
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{self, Read};

use rayon::prelude::*;

use super::index::{Entry, DELIMITER};
use crate::error::{Result, SortError};

/// Maximum populated size of a buffer. The packed index stores offsets
/// and lengths as u32, so anything larger is unaddressable.
pub const MAX_BUFFER_SIZE: usize = u32::MAX as usize;

/// Average token size guess used to pre-size the index.
const TOKEN_SIZE_GUESS: usize = 8;

/// Clamp range for the partition count.
const MIN_PARALLEL: usize = 1;
const MAX_PARALLEL: usize = 8;

/// Partitions below this many entries are not worth a separate worker.
const MIN_SPLIT_SIZE: usize = 1024;

/// A filled byte buffer and the index of the tokens inside it.
///
/// The populated prefix always ends at a delimiter; the index covers it
/// exactly, in input order, with no gaps or overlaps.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    index: Vec<Entry>,
}

impl Buffer {
    /// Read from `reader` until `size` bytes are buffered or the reader is
    /// exhausted, then index the tokens. Bytes after the last delimiter
    /// are split off and returned as the second tuple element so the
    /// caller can re-inject them (a partial token must not be sorted).
    ///
    /// A zero-byte fill yields an empty buffer; a non-empty fill with no
    /// delimiter at all fails with `DelimiterNotFound`.
    pub fn fill<R: Read>(mut reader: R, size: usize) -> Result<(Buffer, Vec<u8>)> {
        if size > MAX_BUFFER_SIZE {
            return Err(SortError::BufferSizeTooBig(size));
        }

        let mut data = vec![0u8; size];
        let n = read_full(&mut reader, &mut data).map_err(|e| SortError::io("read input", e))?;
        data.truncate(n);

        if data.is_empty() {
            return Ok((
                Buffer {
                    data,
                    index: Vec::new(),
                },
                Vec::new(),
            ));
        }

        let Some(last) = memchr::memrchr(DELIMITER, &data) else {
            return Err(SortError::DelimiterNotFound);
        };
        let trimmed = data.split_off(last + 1);

        // One entry per delimiter; the delimiter is part of the length so
        // iteration output can be written verbatim.
        let mut index = Vec::with_capacity(data.len() / TOKEN_SIZE_GUESS + 1);
        let mut offset = 0u32;
        for pos in memchr::memchr_iter(DELIMITER, &data) {
            let end = pos as u32 + 1;
            index.push(Entry::new(offset, end - offset));
            offset = end;
        }

        Ok((Buffer { data, index }, trimmed))
    }

    /// The populated prefix (always delimiter-terminated, possibly empty).
    pub fn populated(&self) -> &[u8] {
        &self.data
    }

    pub fn token_count(&self) -> usize {
        self.index.len()
    }

    /// Give the populated bytes back, e.g. to re-feed them to the
    /// external pipeline when the input turns out not to fit.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Append one more token (plus delimiter) past the populated prefix.
    /// Used by the driver to re-inject an unterminated final token once
    /// the reader is known to be exhausted.
    pub(crate) fn append_token(&mut self, token: &[u8]) {
        debug_assert!(self.data.len() + token.len() < MAX_BUFFER_SIZE);
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(token);
        self.data.push(DELIMITER);
        self.index.push(Entry::new(offset, token.len() as u32 + 1));
    }

    /// Sort the buffer with up to `parallel` concurrent partition workers
    /// and return a streaming iterator over the tokens in ascending order.
    ///
    /// `parallel` is clamped to [1, 8] and reduced further while a
    /// partition would hold fewer than 1024 entries; thrashing a small
    /// index across workers costs more than it saves. Partitions are
    /// contiguous index ranges: the first `p - 1` take exactly
    /// `len / p` entries, the last takes the remainder.
    pub fn sort(&mut self, parallel: usize) -> TokenIter<'_> {
        let mut parallel = parallel.clamp(MIN_PARALLEL, MAX_PARALLEL);
        while parallel > 1 && self.index.len() / parallel < MIN_SPLIT_SIZE {
            parallel -= 1;
        }
        let per_split = self.index.len() / parallel;

        let data: &[u8] = &self.data;
        let mut splits: Vec<&mut [Entry]> = Vec::with_capacity(parallel);
        let mut rest: &mut [Entry] = &mut self.index;
        for i in 0..parallel {
            let take = if i < parallel - 1 { per_split } else { rest.len() };
            let (head, tail) = rest.split_at_mut(take);
            rest = tail;
            if !head.is_empty() {
                splits.push(head);
            }
        }

        // The partitions are disjoint index sub-ranges and the byte
        // storage is only read, so the workers need no synchronization
        // beyond the join rayon provides.
        let compare = |a: &Entry, b: &Entry| a.bytes(data).cmp(b.bytes(data));
        if splits.len() > 1 {
            splits
                .par_iter_mut()
                .for_each(|split| split.sort_unstable_by(compare));
        } else if let Some(split) = splits.first_mut() {
            split.sort_unstable_by(compare);
        }

        let mut heap = BinaryHeap::with_capacity(splits.len());
        for split in splits {
            heap.push(Reverse(Partition {
                data,
                entries: &*split,
            }));
        }
        TokenIter { heap }
    }
}

/// One sorted partition inside the streaming merge heap, keyed by the
/// token its first entry designates.
struct Partition<'a> {
    data: &'a [u8],
    entries: &'a [Entry],
}

impl<'a> Partition<'a> {
    #[inline]
    fn head(&self) -> &'a [u8] {
        self.entries[0].bytes(self.data)
    }
}

impl PartialEq for Partition<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Partition<'_> {}

impl PartialOrd for Partition<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Partition<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.head().cmp(other.head())
    }
}

/// Streaming iterator over a sorted buffer: a min-heap of the non-empty
/// partitions. Yielded slices point into the buffer (delimiter included)
/// and stay valid until the iterator is dropped.
pub struct TokenIter<'a> {
    heap: BinaryHeap<Reverse<Partition<'a>>>,
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let Reverse(part) = self.heap.pop()?;
        let token = part.head();
        if part.entries.len() > 1 {
            self.heap.push(Reverse(Partition {
                data: part.data,
                entries: &part.entries[1..],
            }));
        }
        Some(token)
    }
}

/// Read as many bytes as possible into buf, retrying on partial reads.
/// Short reads from pipes are normal; only a true error aborts the fill.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
