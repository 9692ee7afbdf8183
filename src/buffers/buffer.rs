//! Buffer implementation for producer/consumer handoff

use std::{alloc::Layout, ptr::NonNull, slice};

use crate::{
    error::{HandoffError, Result},
    sharing::SharedRegion,
};

/// Identifier of the pool a buffer was carved from
pub type PoolId = u64;

/// Backing memory of a buffer
#[derive(Debug)]
enum Storage {
    /// Heap block owned by this buffer
    Heap { data: NonNull<u8>, layout: Layout },
    /// Slot inside an externally negotiated region
    Shared(SharedRegion),
}

impl Storage {
    fn heap(capacity: usize, alignment: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HandoffError::invalid_parameter(
                "buffer_size",
                "Buffer size cannot be zero",
            ));
        }
        let layout = Layout::from_size_align(capacity, alignment)
            .map_err(|e| HandoffError::invalid_parameter("alignment", e.to_string()))?;
        // SAFETY: layout has a non-zero size
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let data = NonNull::new(raw).ok_or_else(|| {
            HandoffError::invalid_parameter("buffer_size", "Heap allocation failed")
        })?;
        Ok(Storage::Heap { data, layout })
    }

    fn ptr(&self) -> NonNull<u8> {
        match self {
            Storage::Heap { data, .. } => *data,
            Storage::Shared(region) => region.as_non_null(),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Storage::Heap { layout, .. } => layout.size(),
            Storage::Shared(region) => region.size(),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::Heap { data, layout } = self {
            // SAFETY: allocated in `Storage::heap` with this exact layout
            unsafe { std::alloc::dealloc(data.as_ptr(), *layout) };
        }
        // Shared regions are unmapped by their owner once the last handle goes
    }
}

/// A fixed-capacity buffer with a logical payload size
///
/// A buffer has exactly one owner at a time: the pool while it is free, then
/// the producer, the queue, and the consumer, until it is released back.
/// It is deliberately not `Clone`.
#[derive(Debug)]
pub struct Buffer {
    storage: Storage,
    /// Payload size in bytes
    len: usize,
    /// Pool this buffer belongs to
    pool_id: PoolId,
    /// Slot index inside the pool
    slot: usize,
    /// Sequence number stamped on acquisition
    sequence: u64,
}

impl Buffer {
    /// Allocate a heap-backed buffer for a local pool
    pub(crate) fn heap(pool_id: PoolId, slot: usize, capacity: usize, alignment: usize) -> Result<Self> {
        Ok(Self {
            storage: Storage::heap(capacity, alignment)?,
            len: 0,
            pool_id,
            slot,
            sequence: 0,
        })
    }

    /// Wrap a negotiated shared region
    pub(crate) fn shared(pool_id: PoolId, slot: usize, region: SharedRegion) -> Self {
        Self {
            storage: Storage::Shared(region),
            len: 0,
            pool_id,
            slot,
            sequence: 0,
        }
    }

    /// Get a raw pointer to the buffer data
    pub fn as_ptr(&self) -> *const u8 {
        self.storage.ptr().as_ptr()
    }

    /// Get the payload as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: len <= capacity and this buffer is the sole owner of the slot
        unsafe { slice::from_raw_parts(self.storage.ptr().as_ptr(), self.len) }
    }

    /// Get the payload as a mutable byte slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.storage.ptr().as_ptr(), self.len) }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the underlying slot
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Set the payload size without touching the contents
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(HandoffError::invalid_parameter(
                "len",
                format!("{} exceeds capacity {}", len, self.capacity()),
            ));
        }
        self.len = len;
        Ok(())
    }

    /// Clear the payload (set size to 0)
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Write data at `offset`, growing the payload if needed
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.capacity())
            .ok_or_else(|| {
                HandoffError::invalid_parameter(
                    "data",
                    format!(
                        "{} bytes at offset {} exceed capacity {}",
                        data.len(),
                        offset,
                        self.capacity()
                    ),
                )
            })?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.storage.ptr().as_ptr().add(offset),
                data.len(),
            );
        }

        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    /// Replace the payload with `data`
    pub fn fill(&mut self, data: &[u8]) -> Result<()> {
        self.clear();
        self.write(0, data)
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Whether the memory comes from a negotiated shared region
    pub fn is_shared(&self) -> bool {
        matches!(self.storage, Storage::Shared(_))
    }
}

// A buffer is the unique owner of its slot, so moving it between the producer
// and consumer threads is sound.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for Buffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}
