//! Synchronized handoff of filled buffers from producer to consumer
//!
//! One mutex guards the whole queue state and one condition variable wakes
//! the reader. Sessions follow `Created -> Started -> Created`.

pub mod config;
pub mod handoff;
pub mod state;
pub mod stats;

pub use config::{PoolSource, QueueConfig};
pub use handoff::HandoffQueue;
pub use state::{LifecycleState, StopReport, Take};
pub use stats::QueueStats;
