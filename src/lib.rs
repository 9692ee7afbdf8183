//! # Handoff - Producer/Consumer Buffer Handoff Queue
//!
//! Handoff moves filled buffers from one producer thread to one consumer
//! thread running a pull-based read loop. The producer draws writable buffers
//! from a fixed pool, either allocated locally or negotiated with an external
//! shared-memory registry, and publishes them; the consumer blocks on the
//! queue until a buffer or the end of the stream shows up.
//!
//! ## Features
//!
//! - **Ordered handoff**: buffers are taken in the order they were published
//! - **End of stream**: reported only after every queued buffer was taken
//! - **Lifecycle guard**: production and consumption only inside a session
//! - **Fixed pools**: local heap buffers or lazily negotiated shared regions
//!
//! ## Architecture
//!
//! ```text
//!  producer thread                              consumer thread
//!  ───────────────                              ───────────────
//!  request_buffer()  ◄── BufferPool ◄── release()
//!        │              (local | shared)           ▲
//!        ▼                                         │
//!  publish() ──────► HandoffQueue ──────► take() ──┘
//!  publish_end_of_stream()   (Mutex + Condvar)
//! ```

pub mod buffers;
pub mod error;
pub mod format;
pub mod queue;
pub mod sharing;

// Main API re-exports
pub use buffers::{Buffer, BufferPool, BufferPoolConfig, BufferPoolConfigBuilder, BufferPoolStats, PoolId};
pub use error::{HandoffError, Result};
pub use format::FormatDescriptor;
pub use queue::{HandoffQueue, LifecycleState, PoolSource, QueueConfig, QueueStats, StopReport, Take};
pub use sharing::{BufferSharing, Materialization, MmapSharing, SharedPoolSlot, SharedRegion, SharingError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Default size of one buffer (64KB)
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    /// Default number of buffers in a local pool
    pub const DEFAULT_BUFFER_COUNT: usize = 8;

    /// Default alignment for local buffers
    pub const DEFAULT_ALIGNMENT: usize = 64;
}
