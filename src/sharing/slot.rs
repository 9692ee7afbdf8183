//! One-shot lazy materialization of the shared buffer pool

use std::sync::Arc;

use log::{info, warn};

use crate::{
    buffers::BufferPool,
    error::{HandoffError, Result},
};

use super::BufferSharing;

/// Where the shared pool of a session stands
#[derive(Debug, Clone)]
pub enum Materialization {
    /// No handshake attempted yet this session
    NotAttempted,
    /// Handshake succeeded; the pool is ready
    Materialized(Arc<BufferPool>),
    /// Every attempt so far failed; nothing was kept
    Failed { attempts: u32, last_error: String },
}

/// Holds the shared pool of a sharing-mode session
///
/// The pool is built on the first request: enter sharing mode, query the
/// buffers, wrap each of them. A failed handshake leaves no pool behind and
/// may be retried until `max_attempts` failures have accumulated, after which
/// requests fail without contacting the registry until [`reset`](Self::reset).
#[derive(Debug)]
pub struct SharedPoolSlot {
    name: String,
    max_attempts: Option<u32>,
    state: Materialization,
}

impl SharedPoolSlot {
    /// `max_attempts == None` retries forever
    pub fn new(name: impl Into<String>, max_attempts: Option<u32>) -> Self {
        Self {
            name: name.into(),
            max_attempts,
            state: Materialization::NotAttempted,
        }
    }

    /// Return the pool, running the handshake if it has not succeeded yet
    pub fn get_or_materialize(&mut self, sharing: &dyn BufferSharing) -> Result<Arc<BufferPool>> {
        match &self.state {
            Materialization::Materialized(pool) => return Ok(Arc::clone(pool)),
            Materialization::Failed { attempts, last_error }
                if self.max_attempts.map_or(false, |max| *attempts >= max) =>
            {
                return Err(HandoffError::pool_setup(
                    "retry",
                    format!("giving up after {} attempts: {}", attempts, last_error),
                ));
            }
            _ => {}
        }

        match Self::materialize(&self.name, sharing) {
            Ok(pool) => {
                info!(
                    "Shared pool '{}' ready with {} buffers",
                    self.name,
                    pool.capacity()
                );
                self.state = Materialization::Materialized(Arc::clone(&pool));
                Ok(pool)
            }
            Err(err) => {
                let attempts = self.attempts() + 1;
                warn!(
                    "Shared pool '{}' setup failed (attempt {}): {}",
                    self.name, attempts, err
                );
                self.state = Materialization::Failed {
                    attempts,
                    last_error: err.to_string(),
                };
                Err(err)
            }
        }
    }

    fn materialize(name: &str, sharing: &dyn BufferSharing) -> Result<Arc<BufferPool>> {
        sharing
            .enter_sharing_mode()
            .map_err(|e| HandoffError::pool_setup("enter", e.to_string()))?;

        let regions = sharing
            .query_shared_buffers()
            .map_err(|e| HandoffError::pool_setup("query", e.to_string()))?;
        if regions.is_empty() {
            return Err(HandoffError::pool_setup(
                "query",
                "registry reported no shared buffers",
            ));
        }

        BufferPool::from_regions(name, regions)
            .map(Arc::new)
            .map_err(|e| HandoffError::pool_setup("build", e.to_string()))
    }

    /// The pool, if materialized
    pub fn pool(&self) -> Option<&Arc<BufferPool>> {
        match &self.state {
            Materialization::Materialized(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn state(&self) -> &Materialization {
        &self.state
    }

    /// Failed attempts since the last success or reset
    pub fn attempts(&self) -> u32 {
        match self.state {
            Materialization::Failed { attempts, .. } => attempts,
            _ => 0,
        }
    }

    /// Forget the pool and any failures, handing back the pool if there was one
    pub fn reset(&mut self) -> Option<Arc<BufferPool>> {
        match std::mem::replace(&mut self.state, Materialization::NotAttempted) {
            Materialization::Materialized(pool) => Some(pool),
            _ => None,
        }
    }
}
