//! Handoff queue statistics

/// Counters kept under the queue lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Sessions started so far
    pub sessions: u64,
    /// Buffers accepted by `publish`
    pub published: u64,
    /// Buffers delivered by `take`
    pub taken: u64,
    /// Buffers dropped by `stop`
    pub discarded: u64,
    /// Highest number of buffers queued at once
    pub peak_depth: usize,
    /// Number of times a reader had to wait
    pub waits: u64,
}

impl QueueStats {
    /// Buffers still owed to the consumer, from the counters alone
    pub fn in_flight(&self) -> u64 {
        self.published
            .saturating_sub(self.taken)
            .saturating_sub(self.discarded)
    }

    pub(crate) fn record_publish(&mut self, depth: usize) {
        self.published += 1;
        self.peak_depth = self.peak_depth.max(depth);
    }
}
