//! In-process shared-buffer registry backed by anonymous memory mappings

use std::{
    any::Any,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, PoisonError, Weak,
    },
};

use log::debug;
use memmap2::MmapOptions;

use super::{BufferSharing, SharedRegion, SharingError};

/// A registry that owns `buffer_count` shared buffers of `buffer_size` bytes
///
/// Each call to `enter_sharing_mode` maps a fresh region set, so buffers from
/// an earlier session never alias the ones handed out afterwards. The regions
/// of a mapping are handed out by exactly one `query_shared_buffers`. Failure
/// switches let callers exercise every step of the handshake.
#[derive(Debug)]
pub struct MmapSharing {
    buffer_count: usize,
    buffer_size: usize,
    /// Mapped and not yet handed out
    regions: Mutex<Option<Vec<SharedRegion>>>,
    /// Most recent mapping, kept alive only by the regions carved from it
    mapping: Mutex<Option<Weak<dyn Any + Send + Sync>>>,
    refuse_mode: AtomicBool,
    fail_enter: AtomicBool,
    fail_query: AtomicBool,
    mode_requests: AtomicUsize,
    enter_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl MmapSharing {
    /// Create a registry describing `buffer_count` buffers of `buffer_size` bytes
    pub fn new(buffer_count: usize, buffer_size: usize) -> Self {
        Self {
            buffer_count,
            buffer_size,
            regions: Mutex::new(None),
            mapping: Mutex::new(None),
            refuse_mode: AtomicBool::new(false),
            fail_enter: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            mode_requests: AtomicUsize::new(0),
            enter_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// Refuse (or accept) sharing mode requests
    pub fn set_refuse_mode(&self, refuse: bool) {
        self.refuse_mode.store(refuse, Ordering::SeqCst);
    }

    /// Make `enter_sharing_mode` fail
    pub fn set_fail_enter(&self, fail: bool) {
        self.fail_enter.store(fail, Ordering::SeqCst);
    }

    /// Make `query_shared_buffers` fail
    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn mode_requests(&self) -> usize {
        self.mode_requests.load(Ordering::SeqCst)
    }

    pub fn enter_calls(&self) -> usize {
        self.enter_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Whether the most recent mapping is still referenced by any region
    pub fn is_mapped(&self) -> bool {
        self.mapping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |weak| weak.strong_count() > 0)
    }

    fn map_regions(&self) -> Result<Vec<SharedRegion>, SharingError> {
        let len = self
            .buffer_count
            .checked_mul(self.buffer_size)
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                SharingError::failed(format!(
                    "cannot map {} buffers of {} bytes",
                    self.buffer_count, self.buffer_size
                ))
            })?;

        let map = MmapOptions::new()
            .len(len)
            .map_anon()
            .map_err(|e| SharingError::failed(format!("Failed to create memory mapping: {}", e)))?;
        SharedRegion::split_mapping(map, self.buffer_size)
    }
}

impl BufferSharing for MmapSharing {
    fn request_sharing_mode(&self) -> Result<(), SharingError> {
        self.mode_requests.fetch_add(1, Ordering::SeqCst);
        if self.refuse_mode.load(Ordering::SeqCst) {
            return Err(SharingError::refused("registry does not accept sharing requests"));
        }
        Ok(())
    }

    fn enter_sharing_mode(&self) -> Result<(), SharingError> {
        self.enter_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enter.load(Ordering::SeqCst) {
            return Err(SharingError::failed("sink is not ready to share buffers"));
        }

        let regions = self.map_regions()?;
        debug!(
            "Mapped {} shared buffers of {} bytes",
            regions.len(),
            self.buffer_size
        );
        *self.mapping.lock().unwrap_or_else(PoisonError::into_inner) =
            regions.first().map(SharedRegion::owner_weak);
        *self.regions.lock().unwrap_or_else(PoisonError::into_inner) = Some(regions);
        Ok(())
    }

    fn query_shared_buffers(&self) -> Result<Vec<SharedRegion>, SharingError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(SharingError::failed("unable to retrieve shared buffers"));
        }

        self.regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                SharingError::failed("sharing mode was not entered or its buffers were already handed out")
            })
    }
}
