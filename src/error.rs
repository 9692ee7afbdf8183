//! Error types and handling for the handoff queue

use crate::queue::LifecycleState;

/// Result type alias for handoff operations
pub type Result<T> = std::result::Result<T, HandoffError>;

/// Error types for the handoff queue and its buffer pools
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// Operation invoked outside its legal lifecycle state
    #[error("Invalid state: {operation} not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// The external registry refused to enable buffer sharing
    #[error("Sharing mode unavailable: {reason}")]
    ModeUnavailable { reason: String },

    /// Shared pool materialization failed partway
    #[error("Pool setup failed during {stage}: {message}")]
    PoolSetupFailed {
        stage: &'static str,
        message: String,
    },

    /// Every buffer of the pool is currently handed out
    #[error("Pool exhausted: all {capacity} buffers in use")]
    PoolExhausted { capacity: usize },

    /// Terminal signal from the read side, not a failure
    #[error("End of stream")]
    EndOfStream,

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Format descriptor (de)serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// I/O related errors (mapping shared regions)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl HandoffError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: LifecycleState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create a mode unavailable error
    pub fn mode_unavailable(reason: impl Into<String>) -> Self {
        Self::ModeUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a pool setup error for the given handshake stage
    pub fn pool_setup(stage: &'static str, message: impl Into<String>) -> Self {
        Self::PoolSetupFailed {
            stage,
            message: message.into(),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(capacity: usize) -> Self {
        Self::PoolExhausted { capacity }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether this is the stream terminator rather than a real failure
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

impl From<std::io::Error> for HandoffError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for HandoffError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}
