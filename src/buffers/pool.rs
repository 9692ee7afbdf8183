//! Fixed-size buffer pool handing out writable slots to the producer

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, warn};

use crate::{
    error::{HandoffError, Result},
    sharing::SharedRegion,
};

use super::{
    buffer::{Buffer, PoolId},
    config::BufferPoolConfig,
    stats::{next_buffer_sequence, next_pool_id, AtomicBufferPoolStats, BufferPoolStats},
};

/// A fixed set of buffers, each either free or handed out
///
/// Count and per-buffer capacity are fixed at construction. Free buffers are
/// kept in a FIFO, so slots are handed out round-robin.
#[derive(Debug)]
pub struct BufferPool {
    id: PoolId,
    name: String,
    capacity: usize,
    /// Free buffers, oldest first
    free: Mutex<VecDeque<Buffer>>,
    stats: AtomicBufferPoolStats,
}

impl BufferPool {
    /// Create a pool of heap buffers described by `config`
    pub fn local(config: &BufferPoolConfig) -> Result<Self> {
        config.validate()?;

        let id = next_pool_id();
        let free = (0..config.buffer_count)
            .map(|slot| Buffer::heap(id, slot, config.buffer_size, config.alignment))
            .collect::<Result<VecDeque<_>>>()?;

        debug!(
            "Created local pool '{}' with {} x {} bytes",
            config.name, config.buffer_count, config.buffer_size
        );
        Ok(Self::assemble(id, config.name.clone(), free))
    }

    /// Create a pool with one buffer per negotiated shared region
    ///
    /// Regions must be non-empty and pairwise disjoint, so that no two buffers
    /// of the pool write the same bytes.
    pub fn from_regions(name: impl Into<String>, regions: Vec<SharedRegion>) -> Result<Self> {
        if regions.is_empty() {
            return Err(HandoffError::invalid_parameter(
                "regions",
                "At least one shared region is required",
            ));
        }
        if let Some(slot) = regions.iter().position(|region| region.size() == 0) {
            return Err(HandoffError::invalid_parameter(
                "regions",
                format!("Shared region {} has zero size", slot),
            ));
        }

        let mut by_address: Vec<&SharedRegion> = regions.iter().collect();
        by_address.sort_by_key(|region| region.address());
        if let Some(pair) = by_address.windows(2).find(|pair| pair[0].overlaps(pair[1])) {
            return Err(HandoffError::invalid_parameter(
                "regions",
                format!(
                    "Shared regions at {:#x} and {:#x} overlap",
                    pair[0].address(),
                    pair[1].address()
                ),
            ));
        }

        let id = next_pool_id();
        let free = regions
            .into_iter()
            .enumerate()
            .map(|(slot, region)| Buffer::shared(id, slot, region))
            .collect();
        Ok(Self::assemble(id, name.into(), free))
    }

    fn assemble(id: PoolId, name: String, free: VecDeque<Buffer>) -> Self {
        Self {
            id,
            name,
            capacity: free.len(),
            free: Mutex::new(free),
            stats: AtomicBufferPoolStats::new(),
        }
    }

    /// Take one free buffer out of the pool
    ///
    /// The returned buffer has an empty payload and a fresh sequence number.
    /// Fails with [`HandoffError::PoolExhausted`] when every buffer is out.
    pub fn acquire_slot(&self) -> Result<Buffer> {
        let mut buffer = match self.lock_free().pop_front() {
            Some(buffer) => buffer,
            None => {
                self.stats.record_exhaustion();
                debug!("Pool '{}' exhausted ({} buffers)", self.name, self.capacity);
                return Err(HandoffError::pool_exhausted(self.capacity));
            }
        };

        buffer.clear();
        buffer.set_sequence(next_buffer_sequence());
        self.stats.record_acquisition();
        Ok(buffer)
    }

    /// Return a buffer to the free set
    ///
    /// Buffers from another pool are ignored and `false` is returned; the
    /// buffer is dropped without touching this pool.
    pub fn release(&self, buffer: Buffer) -> bool {
        if !self.owns(&buffer) {
            self.stats.record_foreign_release();
            warn!(
                "Ignoring release of buffer from pool {} into pool '{}' ({})",
                buffer.pool_id(),
                self.name,
                self.id
            );
            return false;
        }

        let mut free = self.lock_free();
        if free.len() >= self.capacity || free.iter().any(|b| b.slot() == buffer.slot()) {
            warn!("Slot {} of pool '{}' is already free", buffer.slot(), self.name);
            return false;
        }
        free.push_back(buffer);
        drop(free);

        self.stats.record_release();
        true
    }

    /// Check whether `buffer` was carved from this pool
    pub fn owns(&self, buffer: &Buffer) -> bool {
        buffer.pool_id() == self.id
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of buffers owned by the pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free buffers
    pub fn available(&self) -> usize {
        self.lock_free().len()
    }

    /// Number of buffers currently handed out
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Get current statistics
    pub fn stats(&self) -> BufferPoolStats {
        self.stats.snapshot(self.capacity)
    }

    fn lock_free(&self) -> MutexGuard<'_, VecDeque<Buffer>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
