//! Buffer pool statistics tracking

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of buffer pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Number of buffers owned by the pool
    pub capacity: usize,
    /// Number of buffers currently handed out
    pub currently_in_use: usize,
    /// Peak number of buffers in use simultaneously
    pub peak_usage: usize,
    /// Successful acquisitions
    pub total_acquisitions: u64,
    /// Buffers returned to the pool
    pub total_releases: u64,
    /// Acquisitions that found no free buffer
    pub exhaustion_count: u64,
    /// Releases ignored because the buffer belonged elsewhere
    pub foreign_releases: u64,
}

impl BufferPoolStats {
    /// Calculate pool utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.currently_in_use as f64 / self.capacity as f64
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "BufferPoolStats {{ capacity: {}, in_use: {}, peak: {}, \
             acquisitions: {}, releases: {}, exhausted: {}, utilization: {:.2}% }}",
            self.capacity,
            self.currently_in_use,
            self.peak_usage,
            self.total_acquisitions,
            self.total_releases,
            self.exhaustion_count,
            self.utilization() * 100.0
        )
    }
}

/// Thread-safe statistics for buffer pools
#[derive(Debug, Default)]
pub struct AtomicBufferPoolStats {
    currently_in_use: AtomicUsize,
    peak_usage: AtomicUsize,
    total_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    exhaustion_count: AtomicU64,
    foreign_releases: AtomicU64,
}

impl AtomicBufferPoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful acquisition
    pub fn record_acquisition(&self) {
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        let in_use = self.currently_in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_usage.fetch_max(in_use, Ordering::Relaxed);
    }

    /// Record a buffer coming back to the pool
    pub fn record_release(&self) {
        self.total_releases.fetch_add(1, Ordering::Relaxed);
        self.currently_in_use.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_exhaustion(&self) {
        self.exhaustion_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign_release(&self) {
        self.foreign_releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self, capacity: usize) -> BufferPoolStats {
        BufferPoolStats {
            capacity,
            currently_in_use: self.currently_in_use.load(Ordering::Relaxed),
            peak_usage: self.peak_usage.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_releases: self.total_releases.load(Ordering::Relaxed),
            exhaustion_count: self.exhaustion_count.load(Ordering::Relaxed),
            foreign_releases: self.foreign_releases.load(Ordering::Relaxed),
        }
    }
}

/// Helper for generating buffer sequence numbers
pub fn next_buffer_sequence() -> u64 {
    static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(1);
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Helper for generating pool identifiers
pub fn next_pool_id() -> u64 {
    static POOL_COUNTER: AtomicU64 = AtomicU64::new(1);
    POOL_COUNTER.fetch_add(1, Ordering::SeqCst)
}
