use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use log::debug;

use super::Chunk;
use crate::cancel::Cancel;
use crate::error::{Result, SortError};
use crate::sort::DELIMITER;

const RUN_BUF_SIZE: usize = 256 * 1024;

/// Name prefix for run files in the temp directory.
const RUN_PREFIX: &str = "bsort";

/// Spawn `num_sorters` workers that each receive chunks, sort them, and
/// write every chunk as a sorted run file in `temp_dir`. Run paths are
/// emitted on the returned queue; the paths' files belong to the caller
/// from that point on, including deletion.
///
/// Both returned channels close when the last worker exits. Any run-file
/// I/O failure is sent on the error queue and stops that worker.
pub fn spawn_sorters(
    cancel: Cancel,
    num_sorters: usize,
    temp_dir: PathBuf,
    chunks: Receiver<Chunk>,
) -> (Receiver<PathBuf>, Receiver<SortError>, Vec<JoinHandle<()>>) {
    let num_sorters = num_sorters.max(1);
    let (runs_tx, runs_rx) = bounded(num_sorters);
    let (errs_tx, errs_rx) = bounded(1);

    let mut handles = Vec::with_capacity(num_sorters);
    for _ in 0..num_sorters {
        let cancel = cancel.clone();
        let chunks = chunks.clone();
        let runs_tx = runs_tx.clone();
        let errs_tx = errs_tx.clone();
        let temp_dir = temp_dir.clone();

        handles.push(thread::spawn(move || loop {
            if cancel.is_cancelled() {
                return;
            }

            // A closed, drained queue means the chunker is done.
            let Ok(mut chunk) = chunks.recv() else {
                return;
            };

            chunk.sort_unstable();

            match write_run(&temp_dir, &chunk) {
                Ok(path) => {
                    debug!("wrote run {} ({} tokens)", path.display(), chunk.len());
                    if runs_tx.send(path).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = errs_tx.send(e);
                    return;
                }
            }
        }));
    }

    (runs_rx, errs_rx, handles)
}

/// Write one sorted chunk as a uniquely named run file, token + delimiter
/// each, and persist it past the tempfile guard.
fn write_run(temp_dir: &Path, chunk: &Chunk) -> Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix(RUN_PREFIX)
        .tempfile_in(temp_dir)
        .map_err(|e| SortError::io("create run file", e))?;

    let mut writer = BufWriter::with_capacity(RUN_BUF_SIZE, file);
    for token in chunk {
        writer
            .write_all(token)
            .map_err(|e| SortError::io("write run file", e))?;
        writer
            .write_all(&[DELIMITER])
            .map_err(|e| SortError::io("write run file", e))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| SortError::io("flush run file", e.into_error()))?;
    let (_file, path) = file
        .keep()
        .map_err(|e| SortError::io("persist run file", e.error))?;
    Ok(path)
}
