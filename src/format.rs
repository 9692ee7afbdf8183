//! Opaque stream format descriptor
//!
//! The queue never interprets the format: it is supplied at construction and
//! handed back unchanged to whoever asks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Key under which the MIME type is conventionally stored
pub const MIME_KEY: &str = "mime";

/// Immutable key/value description of the buffers flowing through a queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    entries: BTreeMap<String, String>,
}

impl FormatDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a descriptor carrying only a MIME type
    pub fn with_mime(mime: impl Into<String>) -> Self {
        Self::new().with(MIME_KEY, mime)
    }

    /// Add an entry, replacing any previous value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn mime(&self) -> Option<&str> {
        self.get(MIME_KEY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode for passing across a process boundary
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a descriptor produced by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
