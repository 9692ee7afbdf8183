//! Handoff queue configuration

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    buffers::BufferPoolConfig,
    error::{HandoffError, Result},
    sharing::BufferSharing,
};

/// Configuration for a handoff queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name used in logs and for the session pool
    pub name: String,
    /// Failed shared-pool handshakes tolerated per session (`None` = unlimited)
    pub max_setup_attempts: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "handoff".to_string(),
            max_setup_attempts: None,
        }
    }
}

impl QueueConfig {
    /// Create a new configuration with custom name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Limit how many failed pool handshakes a session retries
    pub fn with_max_setup_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_setup_attempts = attempts;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(HandoffError::invalid_parameter(
                "name",
                "Queue name cannot be empty",
            ));
        }

        if self.max_setup_attempts == Some(0) {
            return Err(HandoffError::invalid_parameter(
                "max_setup_attempts",
                "At least one setup attempt is required",
            ));
        }

        Ok(())
    }
}

/// Where a session's writable buffers come from
#[derive(Debug, Clone)]
pub enum PoolSource {
    /// A pool allocated locally when the session starts
    Local(BufferPoolConfig),
    /// Buffers negotiated with an external registry, materialized lazily
    Shared(Arc<dyn BufferSharing>),
}

impl PoolSource {
    pub fn is_shared(&self) -> bool {
        matches!(self, PoolSource::Shared(_))
    }
}
