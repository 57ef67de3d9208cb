use std::io::Read;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use super::scan::TokenScanner;
use super::Chunk;
use crate::cancel::Cancel;
use crate::error::SortError;

/// Pre-allocation for the token list of a fresh chunk.
const CHUNK_ALLOCATION: usize = 1024;

/// Spawn the chunk producer: a single thread that reads the given readers
/// sequentially, groups their tokens into chunks of at most `chunk_size`
/// payload bytes, and sends the chunks on a bounded queue.
///
/// The queue's capacity is the pipeline's backpressure point: the
/// producer blocks on a full queue until a sorter catches up. Both
/// returned channels close when the producer exits.
pub fn spawn_chunker(
    cancel: Cancel,
    chunk_size: usize,
    queue_capacity: usize,
    readers: Vec<Box<dyn Read + Send>>,
) -> (Receiver<Chunk>, Receiver<SortError>, JoinHandle<()>) {
    let (chunks_tx, chunks_rx) = bounded(queue_capacity.max(1));
    let (errs_tx, errs_rx) = bounded(1);

    let handle = thread::spawn(move || produce(&cancel, chunk_size, readers, &chunks_tx, &errs_tx));

    (chunks_rx, errs_rx, handle)
}

fn produce(
    cancel: &Cancel,
    chunk_size: usize,
    readers: Vec<Box<dyn Read + Send>>,
    out: &Sender<Chunk>,
    errs: &Sender<SortError>,
) {
    for reader in readers {
        let mut scanner = TokenScanner::new(reader);
        let mut chunk: Chunk = Vec::with_capacity(CHUNK_ALLOCATION);
        let mut current_size = 0usize;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let token = match scanner.next_token() {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(e) => {
                    let _ = errs.send(SortError::io("read input", e));
                    return;
                }
            };

            let token_size = token.len();
            if token_size > chunk_size {
                let _ = errs.send(SortError::TokenTooLarge {
                    size: token_size,
                    chunk_size,
                });
                return;
            }

            if current_size + token_size <= chunk_size {
                chunk.push(token);
                current_size += token_size;
            } else {
                if out.send(chunk).is_err() {
                    return;
                }
                chunk = Vec::with_capacity(CHUNK_ALLOCATION);
                chunk.push(token);
                current_size = token_size;
            }
        }

        // Reader exhausted: emit the partial chunk before moving on.
        if !chunk.is_empty() && out.send(chunk).is_err() {
            return;
        }
    }
}
