use super::AudioBlock;
use parking_lot::{Condvar, Mutex};
use ringbuf::{HeapRb, Rb};
use serde::{Deserialize, Serialize};

/// What the producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Keep the queued blocks and discard the incoming one.
    DropNewest,
    /// Evict the oldest queued block to make room.
    OverwriteOldest,
}

/// Result of handing a block to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The incoming block with this index was discarded.
    DroppedNewest(u64),
    /// The queued block with this index was evicted.
    ReplacedOldest(u64),
    /// Queue closed; the block was discarded.
    Closed,
}

impl PushOutcome {
    pub fn dropped(&self) -> Option<u64> {
        match *self {
            PushOutcome::DroppedNewest(i) | PushOutcome::ReplacedOldest(i) => Some(i),
            _ => None,
        }
    }
}

struct QueueState {
    ring: HeapRb<AudioBlock>,
    closed: bool,
}

/// Bounded single-producer / single-consumer block handoff.
///
/// `push` never waits. `pop` waits for a block and returns `None` once the
/// queue is closed and every queued block has been taken.
pub struct BlockQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    policy: DropPolicy,
    capacity: usize,
}

impl BlockQueue {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                ring: HeapRb::new(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            policy,
            capacity,
        }
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, block: AudioBlock) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            match state.ring.push(block) {
                Ok(()) => PushOutcome::Queued,
                Err(block) => match self.policy {
                    DropPolicy::DropNewest => PushOutcome::DroppedNewest(block.index()),
                    DropPolicy::OverwriteOldest => match state.ring.push_overwrite(block) {
                        Some(evicted) => PushOutcome::ReplacedOldest(evicted.index()),
                        None => PushOutcome::Queued,
                    },
                },
            }
        };

        self.ready.notify_one();
        outcome
    }

    /// Waits for the next block.
    pub fn pop(&self) -> Option<AudioBlock> {
        let mut state = self.state.lock();
        loop {
            if let Some(block) = state.ring.pop() {
                return Some(block);
            }
            if state.closed {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<AudioBlock> {
        self.state.lock().ring.pop()
    }

    /// Rejects further pushes and wakes the consumer so it can drain.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
