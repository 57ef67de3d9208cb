/// Top-level driver: picks in-memory or external mode based on whether
/// the input fits the configured buffer and wires the chosen pipeline.
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{never, select};
use log::debug;

use super::buffer::Buffer;
use crate::cancel::Cancel;
use crate::chunks;
use crate::error::{Result, SortError};

/// 4MB output buffer; keeps flushes rare for large outputs.
const OUTPUT_BUF_SIZE: usize = 4 * 1024 * 1024;

/// Default main memory buffer when the caller does not set one.
const DEFAULT_BUFFER_SIZE: usize = 256 * 1024 * 1024;

/// An opened input stream handed to the driver.
pub type Input = Box<dyn Read + Send>;

/// Configuration for a sort operation.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Maximum populated size of the in-memory buffer, bytes.
    pub buffer_size: usize,
    /// Requested concurrency for in-memory sort partitions (clamped to [1, 8]).
    pub parallel: usize,
    /// Maximum payload of one chunk in external mode, bytes.
    pub chunk_size: usize,
    /// Queue depth between chunker and sorters.
    pub channel_capacity: usize,
    /// Number of parallel external-mode sort workers.
    pub num_sorters: usize,
    /// Directory for run files.
    pub temp_dir: PathBuf,
}

impl Default for SortConfig {
    fn default() -> Self {
        let parallel = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        SortConfig::for_buffer(DEFAULT_BUFFER_SIZE, parallel)
    }
}

impl SortConfig {
    /// Derive the external-mode knobs from a buffer size and a worker
    /// count. The buffer budget is split between the chunks waiting in
    /// the queue and the chunks held by the sorter workers, so chunk
    /// size is `buffer / workers / 2` and the queue holds the rest.
    pub fn for_buffer(buffer_size: usize, parallel: usize) -> Self {
        let parallel = parallel.max(1);
        let chunk_size = (buffer_size / parallel / 2).max(1);
        let total_chunks = buffer_size / chunk_size;
        let channel_capacity = total_chunks.saturating_sub(parallel).max(1);
        SortConfig {
            buffer_size,
            parallel,
            chunk_size,
            channel_capacity,
            num_sorters: parallel,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Sort all tokens from `inputs` into `writer`.
///
/// A single input is probed with one buffer fill: if the whole stream
/// fits, the buffer is sorted in memory and streamed out; otherwise the
/// consumed bytes are re-fed ahead of the remaining stream into the
/// external pipeline. Multiple inputs go straight to external mode so
/// per-reader token boundaries are preserved.
///
/// Cancellation stops every stage at its next queue or I/O boundary and
/// returns Ok; output may be partial.
pub fn run<W: Write>(
    config: &SortConfig,
    mut inputs: Vec<Input>,
    writer: W,
    cancel: &Cancel,
) -> Result<()> {
    if inputs.is_empty() {
        return Ok(());
    }

    if inputs.len() > 1 {
        return sort_external(config, inputs, writer, cancel);
    }

    let mut reader = inputs.remove(0);
    let (mut buffer, trimmed) = Buffer::fill(&mut reader, config.buffer_size)?;
    let filled = buffer.populated().len() + trimmed.len();

    if filled < config.buffer_size {
        // Short fill means the reader is exhausted: everything fits.
        // An unterminated final token is still a token; re-inject it.
        if !trimmed.is_empty() {
            buffer.append_token(&trimmed);
        }
        return sort_in_memory(config, buffer, writer, cancel);
    }

    debug!(
        "input exceeds the {} byte buffer, switching to external mode",
        config.buffer_size
    );
    let consumed: Input = Box::new(Cursor::new(buffer.into_bytes()));
    let remainder: Input = Box::new(Cursor::new(trimmed).chain(reader));
    sort_external(config, vec![consumed, remainder], writer, cancel)
}

fn sort_in_memory<W: Write>(
    config: &SortConfig,
    mut buffer: Buffer,
    writer: W,
    cancel: &Cancel,
) -> Result<()> {
    debug!("in-memory sort of {} tokens", buffer.token_count());
    let mut out = BufWriter::with_capacity(OUTPUT_BUF_SIZE, writer);
    for token in buffer.sort(config.parallel) {
        if cancel.is_cancelled() {
            return Ok(());
        }
        out.write_all(token)
            .map_err(|e| SortError::io("write output", e))?;
    }
    out.flush().map_err(|e| SortError::io("flush output", e))
}

fn sort_external<W: Write>(
    config: &SortConfig,
    inputs: Vec<Input>,
    writer: W,
    cancel: &Cancel,
) -> Result<()> {
    let (chunks_rx, chunker_errs, chunker_handle) = chunks::spawn_chunker(
        cancel.clone(),
        config.chunk_size,
        config.channel_capacity,
        inputs,
    );
    let (runs_rx, sorter_errs, sorter_handles) = chunks::spawn_sorters(
        cancel.clone(),
        config.num_sorters,
        config.temp_dir.clone(),
        chunks_rx,
    );

    // Collect run paths while watching both error queues. The first
    // error cancels the pipeline; draining continues until the sorters
    // close the runs queue so no worker is left blocked on a send.
    let mut runs: Vec<PathBuf> = Vec::new();
    let mut first_err: Option<SortError> = None;
    let mut chunker_errs_sel = chunker_errs.clone();
    let mut sorter_errs_sel = sorter_errs.clone();

    loop {
        select! {
            recv(runs_rx) -> msg => match msg {
                Ok(path) => runs.push(path),
                Err(_) => break,
            },
            recv(chunker_errs_sel) -> msg => match msg {
                Ok(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                        cancel.cancel();
                    }
                }
                Err(_) => chunker_errs_sel = never(),
            },
            recv(sorter_errs_sel) -> msg => match msg {
                Ok(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                        cancel.cancel();
                    }
                }
                Err(_) => sorter_errs_sel = never(),
            },
        }
    }

    let _ = chunker_handle.join();
    for handle in sorter_handles {
        let _ = handle.join();
    }

    // The runs queue can close before a buffered error was selected;
    // sweep both queues now that every producer has exited.
    if first_err.is_none() {
        first_err = chunker_errs
            .try_iter()
            .next()
            .or_else(|| sorter_errs.try_iter().next());
    }

    if let Some(err) = first_err {
        remove_runs(&runs);
        return Err(err);
    }
    if cancel.is_cancelled() {
        remove_runs(&runs);
        return Ok(());
    }

    debug!("merging {} runs", runs.len());
    let mut files = Vec::with_capacity(runs.len());
    for path in &runs {
        match File::open(path) {
            Ok(file) => files.push(file),
            Err(e) => {
                remove_runs(&runs);
                return Err(SortError::io("open run file", e));
            }
        }
    }

    let result = chunks::merge(cancel, files, writer);
    remove_runs(&runs);
    result
}

/// Run files are ephemeral; best-effort removal once the merge is done
/// or the pipeline failed.
fn remove_runs(runs: &[PathBuf]) {
    for path in runs {
        let _ = fs::remove_file(path);
    }
}

/// Parse a buffer size string like "10K", "64M", "1G".
pub fn parse_buffer_size(s: &str) -> std::result::Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty buffer size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid buffer size: {}", s))?;

    let multiplier = match suffix {
        Some('K') | Some('k') => 1024,
        Some('M') | Some('m') => 1024 * 1024,
        Some('G') | Some('g') => 1024 * 1024 * 1024,
        Some('T') | Some('t') => 1024usize.pow(4),
        Some('b') => 512,
        Some(c) => return Err(format!("invalid suffix '{}' in buffer size", c)),
        None => 1,
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("buffer size too large: {}", s))
}
