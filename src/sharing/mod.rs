//! Shared-buffer negotiation with an external registry
//!
//! When a session runs in sharing mode its buffers are not allocated locally:
//! the registry owns the memory and reports it as a list of regions. The pool
//! wrapping those regions is built lazily, once, on the first buffer request
//! after the session starts.

pub mod mmap;
pub mod region;
pub mod slot;

pub use mmap::MmapSharing;
pub use region::SharedRegion;
pub use slot::{Materialization, SharedPoolSlot};

/// Errors reported by a shared-buffer registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SharingError {
    /// The registry declined to enable sharing mode
    #[error("sharing refused: {reason}")]
    Refused { reason: String },

    /// A registry call failed
    #[error("registry call failed: {message}")]
    Failed { message: String },
}

impl SharingError {
    pub fn refused(reason: impl Into<String>) -> Self {
        Self::Refused {
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// The three registry calls consumed by a sharing-mode session
///
/// The session never asks the registry to leave sharing mode; it only drops
/// its own pool on stop.
pub trait BufferSharing: Send + Sync + std::fmt::Debug {
    /// Ask the registry whether this source may use shared buffers
    fn request_sharing_mode(&self) -> Result<(), SharingError>;

    /// Switch the registry into sharing mode
    fn enter_sharing_mode(&self) -> Result<(), SharingError>;

    /// List the shared buffers, in registry order
    fn query_shared_buffers(&self) -> Result<Vec<SharedRegion>, SharingError>;
}
