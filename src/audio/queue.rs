// Chunk queue bridging the connection task and the blocking recognition worker
//
// The producer side lives on the async connection loop and never blocks a
// runtime thread: pushes either complete immediately or (in `Block` mode)
// suspend on a tokio `Notify`. The consumer side lives on a blocking thread
// and parks on a condition variable, so an idle session costs no CPU.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::AudioChunk;

/// What to do when a bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until the worker frees a slot
    #[default]
    Block,
    /// Evict the oldest pending chunk to make room
    DropOldest,
}

/// Queue sizing
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueConfig {
    /// Maximum pending chunks (None = unbounded)
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

/// Item handed to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Chunk(AudioChunk),
    /// No more audio will follow
    End,
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest pending chunk
    DroppedOldest,
    /// The queue was already closed
    Rejected,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    /// Sentinel has been enqueued
    closed: bool,
    /// Sentinel has been handed to the consumer
    drained: bool,
    dropped: usize,
}

/// FIFO of audio chunks terminated by a single end sentinel
#[derive(Debug, Default)]
pub struct ChunkQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    /// Wakes the blocking consumer
    available: Condvar,
    /// Wakes an async producer waiting for capacity
    space: Notify,
}

impl ChunkQueue {
    pub fn new(config: QueueConfig) -> Self {
        if let Some(0) = config.capacity {
            warn!("Chunk queue capacity of 0 is treated as 1");
        }

        Self {
            config,
            ..Default::default()
        }
    }

    pub fn unbounded() -> Self {
        Self::new(QueueConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means another thread panicked mid-push; the
        // VecDeque itself is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn capacity(&self) -> Option<usize> {
        self.config.capacity.map(|c| c.max(1))
    }

    /// Push a chunk from the connection loop
    pub async fn push(&self, chunk: AudioChunk) -> PushOutcome {
        let mut chunk = Some(chunk);

        loop {
            // Register interest before checking so a slot freed in between
            // leaves a stored permit instead of a lost wakeup.
            let notified = self.space.notified();

            {
                let mut state = self.lock();
                if state.closed {
                    debug!("Chunk pushed after close; rejecting");
                    return PushOutcome::Rejected;
                }

                let full = self
                    .capacity()
                    .is_some_and(|cap| state.items.len() >= cap);

                if !full {
                    if let Some(chunk) = chunk.take() {
                        state.items.push_back(QueueItem::Chunk(chunk));
                    }
                    self.available.notify_one();
                    return PushOutcome::Accepted;
                }

                if self.config.overflow == OverflowPolicy::DropOldest {
                    state.items.pop_front();
                    state.dropped += 1;
                    if let Some(chunk) = chunk.take() {
                        state.items.push_back(QueueItem::Chunk(chunk));
                    }
                    self.available.notify_one();
                    return PushOutcome::DroppedOldest;
                }
            }

            notified.await;
        }
    }

    /// Enqueue the end sentinel; returns true only for the call that did so
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        state.closed = true;
        state.items.push_back(QueueItem::End);
        drop(state);

        self.available.notify_all();
        // Release a producer parked on a full queue; it will observe `closed`.
        self.space.notify_waiters();
        self.space.notify_one();
        true
    }

    /// Block until the next item is available.
    ///
    /// Returns `None` once the sentinel has already been consumed.
    pub fn pull(&self) -> Option<QueueItem> {
        let mut state = self.lock();
        loop {
            if let Some(item) = self.take_front(&mut state) {
                return Some(item);
            }
            if state.drained {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Non-blocking pull
    pub fn try_pull(&self) -> Option<QueueItem> {
        let mut state = self.lock();
        self.take_front(&mut state)
    }

    fn take_front(&self, state: &mut QueueState) -> Option<QueueItem> {
        let item = state.items.pop_front()?;
        if item == QueueItem::End {
            state.drained = true;
        } else {
            self.space.notify_one();
        }
        Some(item)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Chunks waiting for the worker (sentinel excluded)
    pub fn pending(&self) -> usize {
        self.lock()
            .items
            .iter()
            .filter(|item| matches!(item, QueueItem::Chunk(_)))
            .count()
    }

    /// Chunks evicted by the drop-oldest policy
    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn chunk(byte: u8) -> AudioChunk {
        AudioChunk::new(vec![byte])
    }

    #[tokio::test]
    async fn test_items_come_out_in_push_order() {
        let queue = ChunkQueue::unbounded();
        for b in [1, 2, 3] {
            assert_eq!(queue.push(chunk(b)).await, PushOutcome::Accepted);
        }
        assert!(queue.close());

        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(1))));
        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(2))));
        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(3))));
        assert_eq!(queue.try_pull(), Some(QueueItem::End));
        assert_eq!(queue.pull(), None);
    }

    #[tokio::test]
    async fn test_close_enqueues_single_sentinel() {
        let queue = ChunkQueue::unbounded();
        assert!(queue.close());
        assert!(!queue.close());
        assert!(!queue.close());

        assert_eq!(queue.try_pull(), Some(QueueItem::End));
        assert_eq!(queue.try_pull(), None);
    }

    #[tokio::test]
    async fn test_push_after_close_is_rejected() {
        let queue = ChunkQueue::unbounded();
        queue.push(chunk(1)).await;
        queue.close();

        assert_eq!(queue.push(chunk(2)).await, PushOutcome::Rejected);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_front() {
        let queue = ChunkQueue::new(QueueConfig {
            capacity: Some(2),
            overflow: OverflowPolicy::DropOldest,
        });

        queue.push(chunk(1)).await;
        queue.push(chunk(2)).await;
        assert_eq!(queue.push(chunk(3)).await, PushOutcome::DroppedOldest);
        assert_eq!(queue.dropped(), 1);

        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(2))));
        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(3))));
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_consumer() {
        let queue = Arc::new(ChunkQueue::new(QueueConfig {
            capacity: Some(1),
            overflow: OverflowPolicy::Block,
        }));
        queue.push(chunk(1)).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(chunk(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(1))));
        let outcome = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PushOutcome::Accepted);
        assert_eq!(queue.try_pull(), Some(QueueItem::Chunk(chunk(2))));
    }

    #[tokio::test]
    async fn test_close_releases_blocked_producer() {
        let queue = Arc::new(ChunkQueue::new(QueueConfig {
            capacity: Some(1),
            overflow: OverflowPolicy::Block,
        }));
        queue.push(chunk(1)).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(chunk(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let outcome = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PushOutcome::Rejected);
    }

    #[test]
    fn test_blocking_pull_wakes_on_push_from_other_thread() {
        let queue = Arc::new(ChunkQueue::unbounded());
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pull() {
                    seen.push(item);
                }
                seen
            })
        };

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            queue.push(chunk(7)).await;
            queue.push(chunk(8)).await;
        });
        queue.close();

        let seen = consumer.join().unwrap();
        assert_eq!(
            seen,
            vec![
                QueueItem::Chunk(chunk(7)),
                QueueItem::Chunk(chunk(8)),
                QueueItem::End
            ]
        );
    }
}
