use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Events the pipeline counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Processed,
    /// Blocks lost at the queue handoff.
    QueueDrops,
    /// Blocks rejected for their shape.
    Invalid,
    OutOfOrder,
    /// Sequence jumps of more than one block.
    Gaps,
    Silent,
    Held,
    /// Blocks steered with an estimate older than the block itself.
    StaleTolerated,
    Passthrough,
    DeadlineMisses,
}

const COUNTERS: usize = 10;

/// Lock-free counters shared between the worker and observers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    counts: [AtomicU64; COUNTERS],
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self, counter: Counter) {
        self.counts[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter as usize].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.get(Counter::Processed),
            queue_drops: self.get(Counter::QueueDrops),
            invalid: self.get(Counter::Invalid),
            out_of_order: self.get(Counter::OutOfOrder),
            gaps: self.get(Counter::Gaps),
            silent: self.get(Counter::Silent),
            held: self.get(Counter::Held),
            stale_tolerated: self.get(Counter::StaleTolerated),
            passthrough: self.get(Counter::Passthrough),
            deadline_misses: self.get(Counter::DeadlineMisses),
        }
    }
}

/// Copy of every counter at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub queue_drops: u64,
    pub invalid: u64,
    pub out_of_order: u64,
    pub gaps: u64,
    pub silent: u64,
    pub held: u64,
    pub stale_tolerated: u64,
    pub passthrough: u64,
    pub deadline_misses: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} dropped={} invalid={} out_of_order={} gaps={} silent={} held={} stale={} passthrough={} late={}",
            self.processed,
            self.queue_drops,
            self.invalid,
            self.out_of_order,
            self.gaps,
            self.silent,
            self.held,
            self.stale_tolerated,
            self.passthrough,
            self.deadline_misses
        )
    }
}
