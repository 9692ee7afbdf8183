//! Descriptors for externally negotiated shared memory

use std::{
    any::Any,
    fmt,
    ptr::NonNull,
    sync::{Arc, Weak},
};

use memmap2::MmapMut;

use super::SharingError;

/// One shared buffer as reported by the registry: a base address and a size
///
/// The region carries an owner handle that keeps the underlying mapping alive,
/// so a buffer built on it never outlives its memory even after the pool that
/// wrapped it is gone. A region is not `Clone`: whoever holds it is the only
/// party allowed to write the memory.
pub struct SharedRegion {
    ptr: NonNull<u8>,
    size: usize,
    owner: Arc<dyn Any + Send + Sync>,
}

impl SharedRegion {
    /// Build a region from a raw address handed out by a registry
    ///
    /// # Safety
    /// The caller must ensure that:
    /// - `ptr` points to `size` writable bytes
    /// - the memory stays valid for as long as `owner` is alive
    /// - nothing else writes to the memory while a buffer wraps it
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize, owner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { ptr, size, owner }
    }

    /// Split a mapping into `slot_size` regions, one per shared buffer
    ///
    /// Trailing bytes that do not fill a whole slot are left unused.
    pub fn split_mapping(mut map: MmapMut, slot_size: usize) -> Result<Vec<Self>, SharingError> {
        if slot_size == 0 || map.len() < slot_size {
            return Err(SharingError::failed(format!(
                "mapping of {} bytes cannot hold slots of {} bytes",
                map.len(),
                slot_size
            )));
        }

        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| SharingError::failed("mapping has a null base address"))?;
        let count = map.len() / slot_size;
        // Moving the MmapMut into the Arc does not move the mapped pages
        let owner: Arc<dyn Any + Send + Sync> = Arc::new(map);

        Ok((0..count)
            .map(|index| {
                // SAFETY: every slot lies inside the mapping and slots do not overlap
                let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(index * slot_size)) };
                Self {
                    ptr,
                    size: slot_size,
                    owner: Arc::clone(&owner),
                }
            })
            .collect())
    }

    /// Base address of the region
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// End address of the region, one past the last byte
    pub fn end_address(&self) -> usize {
        self.address() + self.size
    }

    /// Check whether two regions share at least one byte
    pub fn overlaps(&self, other: &SharedRegion) -> bool {
        self.address() < other.end_address() && other.address() < self.end_address()
    }

    /// Weak handle on the backing memory, alive while any region of it is
    pub(crate) fn owner_weak(&self) -> Weak<dyn Any + Send + Sync> {
        Arc::downgrade(&self.owner)
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("size", &self.size)
            .finish()
    }
}

// The region is only a descriptor; exclusive access is enforced by the
// buffer that wraps it.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_mapping_into_slots() {
        let map = MmapMut::map_anon(4096).unwrap();
        let regions = SharedRegion::split_mapping(map, 1000).unwrap();

        assert_eq!(regions.len(), 4);
        assert!(regions.iter().all(|r| r.size() == 1000));
        assert_eq!(regions[1].address() - regions[0].address(), 1000);
        assert!(!regions[0].overlaps(&regions[1]));

        let weak = regions[0].owner_weak();
        drop(regions);
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_overlap_detection() {
        let map = MmapMut::map_anon(256).unwrap();
        let regions = SharedRegion::split_mapping(map, 128).unwrap();
        // SAFETY: never written; only the address range is inspected
        let straddling = unsafe {
            SharedRegion::from_raw(
                NonNull::new_unchecked(regions[0].as_non_null().as_ptr().add(64)),
                128,
                Arc::new(()),
            )
        };

        assert!(straddling.overlaps(&regions[0]));
        assert!(straddling.overlaps(&regions[1]));
        assert!(!regions[0].overlaps(&regions[1]));
    }

    #[test]
    fn test_split_mapping_rejects_oversized_slots() {
        let map = MmapMut::map_anon(128).unwrap();
        assert!(SharedRegion::split_mapping(map, 256).is_err());
    }
}
