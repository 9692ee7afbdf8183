//! Lifecycle states and read outcomes

use std::fmt;

use crate::buffers::Buffer;

/// Lifecycle of a handoff session
///
/// `Created --start()--> Started --stop()--> Created`. Production and
/// consumption are only legal while `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Started,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a blocking read produced
#[derive(Debug)]
pub enum Take {
    /// The oldest published buffer; the caller now owns it
    Buffer(Buffer),
    /// All published buffers were drained and the producer declared the end
    EndOfStream,
}

impl Take {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Take::EndOfStream)
    }

    pub fn into_buffer(self) -> Option<Buffer> {
        match self {
            Take::Buffer(buffer) => Some(buffer),
            Take::EndOfStream => None,
        }
    }
}

/// Outcome of stopping a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Queued buffers dropped without being read
    pub discarded: usize,
    /// Whether a pool was released with the session
    pub pool_released: bool,
}
