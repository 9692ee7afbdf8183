//! Buffers and fixed-size buffer pools
//!
//! This module provides the writable slots the producer fills before handing
//! them to the queue, either heap-allocated or carved from shared regions.

pub mod buffer;
pub mod config;
pub mod pool;
pub mod stats;

// Re-export main types
pub use buffer::{Buffer, PoolId};
pub use config::{BufferPoolConfig, BufferPoolConfigBuilder};
pub use pool::BufferPool;
pub use stats::{AtomicBufferPoolStats, BufferPoolStats};
