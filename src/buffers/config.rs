//! Buffer pool configuration

use serde::{Deserialize, Serialize};

use crate::error::{HandoffError, Result};

/// Configuration for locally allocated buffer pools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Name of the buffer pool
    pub name: String,
    /// Size of each buffer in bytes
    pub buffer_size: usize,
    /// Number of buffers in the pool
    pub buffer_count: usize,
    /// Alignment requirement for buffers
    pub alignment: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            buffer_size: crate::config::DEFAULT_BUFFER_SIZE,
            buffer_count: crate::config::DEFAULT_BUFFER_COUNT,
            alignment: crate::config::DEFAULT_ALIGNMENT,
        }
    }
}

impl BufferPoolConfig {
    /// Create a new configuration with custom name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set buffer size
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set buffer count
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set buffer alignment
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(HandoffError::invalid_parameter(
                "buffer_size",
                "Buffer size cannot be zero",
            ));
        }

        if self.buffer_count == 0 {
            return Err(HandoffError::invalid_parameter(
                "buffer_count",
                "Buffer count cannot be zero",
            ));
        }

        if !self.alignment.is_power_of_two() {
            return Err(HandoffError::invalid_parameter(
                "alignment",
                "Alignment must be a power of two",
            ));
        }

        Ok(())
    }

    /// Calculate total memory required
    pub fn total_memory_required(&self) -> usize {
        self.buffer_size * self.buffer_count
    }
}

/// Builder pattern for buffer pool configuration
pub struct BufferPoolConfigBuilder {
    config: BufferPoolConfig,
}

impl BufferPoolConfigBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: BufferPoolConfig::new(name),
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn buffer_count(mut self, count: usize) -> Self {
        self.config.buffer_count = count;
        self
    }

    pub fn alignment(mut self, alignment: usize) -> Self {
        self.config.alignment = alignment;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<BufferPoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
