// Request adapter: turns the chunk queue into the recognizer's request stream
//
// Runs on the blocking worker thread. Each `next()` parks on the queue's
// condition variable until a chunk or the end sentinel arrives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::recognizer::AudioRequest;
use crate::audio::{ChunkQueue, QueueItem};

/// Iterator over queued audio, ending at the sentinel
pub struct QueueRequests {
    queue: Arc<ChunkQueue>,
    forwarded: Arc<AtomicUsize>,
    finished: bool,
}

impl QueueRequests {
    pub fn new(queue: Arc<ChunkQueue>) -> Self {
        Self::with_counter(queue, Arc::new(AtomicUsize::new(0)))
    }

    /// Same as `new`, counting forwarded requests into `forwarded`
    pub fn with_counter(queue: Arc<ChunkQueue>, forwarded: Arc<AtomicUsize>) -> Self {
        Self {
            queue,
            forwarded,
            finished: false,
        }
    }
}

impl Iterator for QueueRequests {
    type Item = AudioRequest;

    fn next(&mut self) -> Option<AudioRequest> {
        if self.finished {
            return None;
        }

        match self.queue.pull() {
            Some(QueueItem::Chunk(chunk)) => {
                let seq = self.forwarded.fetch_add(1, Ordering::SeqCst);
                debug!("Forwarding audio request {} ({} bytes)", seq, chunk.len());
                Some(chunk.into())
            }
            Some(QueueItem::End) | None => {
                debug!(
                    "End of audio after {} requests; closing request stream",
                    self.forwarded.load(Ordering::SeqCst)
                );
                self.finished = true;
                None
            }
        }
    }
}
