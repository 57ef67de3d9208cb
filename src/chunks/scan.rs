use std::io::{self, BufRead, BufReader, Read};

use crate::sort::DELIMITER;

const SCAN_BUF_SIZE: usize = 256 * 1024;

/// Newline token scanner shared by the chunker and the k-way merger.
///
/// Tokens exclude their delimiter; a trailing token with no newline is
/// still emitted. `\r` is an ordinary byte, never stripped.
pub struct TokenScanner<R> {
    inner: BufReader<R>,
}

impl<R: Read> TokenScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(SCAN_BUF_SIZE, reader),
        }
    }

    /// Next token as an owned Vec, or None at end of input.
    pub fn next_token(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::with_capacity(64);
        let n = self.inner.read_until(DELIMITER, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&DELIMITER) {
            buf.pop();
        }
        Ok(Some(buf))
    }
}
