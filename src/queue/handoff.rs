//! The producer/consumer handoff queue

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError},
    time::Duration,
};

use log::{debug, error, info, trace, warn};

use crate::{
    buffers::{Buffer, BufferPool, BufferPoolConfig, BufferPoolStats},
    error::{HandoffError, Result},
    format::FormatDescriptor,
    sharing::{BufferSharing, SharedPoolSlot},
};

use super::{
    config::{PoolSource, QueueConfig},
    state::{LifecycleState, StopReport, Take},
    stats::QueueStats,
};

/// The pool backing the current session
#[derive(Debug)]
enum SessionPool {
    /// No session running
    Inactive,
    Local(Arc<BufferPool>),
    Shared {
        sharing: Arc<dyn BufferSharing>,
        /// Handshake state; locked on its own so the registry is never
        /// contacted while the queue lock is held
        slot: Arc<Mutex<SharedPoolSlot>>,
        /// Copy of the pool once the handshake succeeded
        pool: Option<Arc<BufferPool>>,
    },
}

impl SessionPool {
    fn current(&self) -> Option<&Arc<BufferPool>> {
        match self {
            SessionPool::Inactive => None,
            SessionPool::Local(pool) => Some(pool),
            SessionPool::Shared { pool, .. } => pool.as_ref(),
        }
    }
}

/// What `request_buffer` found under the queue lock
enum PoolLookup {
    Ready(Arc<BufferPool>),
    Handshake {
        sharing: Arc<dyn BufferSharing>,
        slot: Arc<Mutex<SharedPoolSlot>>,
        session: u64,
    },
}

/// Everything guarded by the queue lock
#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    /// Published, not yet taken; front is the oldest
    pending: VecDeque<Buffer>,
    /// Only ever goes false -> true within a session
    end_of_stream: bool,
    /// Bumped on every start so waiters can tell sessions apart
    session: u64,
    pool: SessionPool,
    stats: QueueStats,
}

/// Hands filled buffers from one producer thread to one consumer thread
///
/// The producer requests a writable buffer, fills it and publishes it (or
/// publishes the end of the stream). The consumer calls [`take`](Self::take),
/// which blocks until a buffer or the end of the stream is available. Buffers
/// are delivered in the order they were published, and the end of the stream
/// is only reported once every earlier buffer has been taken.
///
/// Queue state lives behind a single mutex paired with one condition variable.
/// `take` is the only call that waits. The registry handshake of sharing mode
/// runs outside that mutex, so readers and the end-of-stream signal never wait
/// on the registry.
///
/// # Examples
///
/// ```
/// use handoff::{BufferPoolConfig, FormatDescriptor, HandoffQueue, Take};
///
/// let queue = HandoffQueue::with_local_pool(
///     FormatDescriptor::with_mime("video/raw"),
///     BufferPoolConfig::new("frames").with_buffer_count(2).with_buffer_size(64),
/// )?;
/// queue.start()?;
///
/// let mut buffer = queue.request_buffer()?;
/// buffer.fill(b"frame-0")?;
/// queue.publish(buffer)?;
/// queue.publish_end_of_stream()?;
///
/// let frame = queue.take()?.into_buffer().unwrap();
/// assert_eq!(frame.as_slice(), b"frame-0");
/// queue.release(frame);
/// assert!(matches!(queue.take()?, Take::EndOfStream));
///
/// queue.stop()?;
/// # Ok::<(), handoff::HandoffError>(())
/// ```
#[derive(Debug)]
pub struct HandoffQueue {
    config: QueueConfig,
    format: Arc<FormatDescriptor>,
    source: PoolSource,
    inner: Mutex<Inner>,
    /// Signalled on publish, end of stream and stop
    available: Condvar,
}

impl HandoffQueue {
    /// Create a queue in the `Created` state
    pub fn new(format: FormatDescriptor, source: PoolSource, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        if let PoolSource::Local(pool_config) = &source {
            pool_config.validate()?;
        }

        Ok(Self {
            config,
            format: Arc::new(format),
            source,
            inner: Mutex::new(Inner {
                state: LifecycleState::Created,
                pending: VecDeque::new(),
                end_of_stream: false,
                session: 0,
                pool: SessionPool::Inactive,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        })
    }

    /// Create a queue whose buffers are negotiated with `sharing`
    pub fn with_sharing(format: FormatDescriptor, sharing: Arc<dyn BufferSharing>) -> Result<Self> {
        Self::new(format, PoolSource::Shared(sharing), QueueConfig::default())
    }

    /// Create a queue with a locally allocated pool
    pub fn with_local_pool(format: FormatDescriptor, pool: BufferPoolConfig) -> Result<Self> {
        Self::new(format, PoolSource::Local(pool), QueueConfig::default())
    }

    /// Begin a session
    ///
    /// In sharing mode this asks the registry to enable shared buffers; a
    /// refusal fails with [`HandoffError::ModeUnavailable`] and leaves the
    /// queue `Created`. There is no fallback to local buffers. The shared pool
    /// itself is built on the first [`request_buffer`](Self::request_buffer).
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();

        if inner.state != LifecycleState::Created {
            debug!("'{}': start in invalid state {}", self.config.name, inner.state);
            return Err(HandoffError::invalid_state("start", inner.state));
        }

        let pool = match &self.source {
            PoolSource::Shared(sharing) => {
                if let Err(e) = sharing.request_sharing_mode() {
                    error!("'{}': shared buffer mode not available: {}", self.config.name, e);
                    return Err(HandoffError::mode_unavailable(e.to_string()));
                }
                info!("'{}': shared buffer mode available", self.config.name);
                SessionPool::Shared {
                    sharing: Arc::clone(sharing),
                    slot: Arc::new(Mutex::new(SharedPoolSlot::new(
                        self.config.name.clone(),
                        self.config.max_setup_attempts,
                    ))),
                    pool: None,
                }
            }
            PoolSource::Local(config) => SessionPool::Local(Arc::new(BufferPool::local(config)?)),
        };

        inner.pool = pool;
        inner.pending.clear();
        inner.end_of_stream = false;
        inner.session += 1;
        inner.state = LifecycleState::Started;
        inner.stats.sessions += 1;

        debug!("'{}': session {} started", self.config.name, inner.session);
        Ok(())
    }

    /// Queue a filled buffer and wake one waiting reader
    ///
    /// Returns the number of buffers now queued. Outside a session the call
    /// fails with [`HandoffError::InvalidState`] and the buffer is dropped; use
    /// [`try_publish`](Self::try_publish) to get it back instead.
    pub fn publish(&self, buffer: Buffer) -> Result<usize> {
        self.try_publish(buffer).map_err(|(err, _rejected)| err)
    }

    /// Like [`publish`](Self::publish), handing the buffer back on failure
    pub fn try_publish(&self, buffer: Buffer) -> std::result::Result<usize, (HandoffError, Buffer)> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            return Err((HandoffError::invalid_state("publish", inner.state), buffer));
        }
        if inner.end_of_stream {
            debug!("'{}': buffer published after end of stream", self.config.name);
        }

        inner.pending.push_back(buffer);
        let depth = inner.pending.len();
        inner.stats.record_publish(depth);
        drop(inner);

        self.available.notify_one();
        Ok(depth)
    }

    /// Declare that no more buffers will follow and wake every reader
    ///
    /// Buffers already queued stay queued and are taken before the end of the
    /// stream is reported. Returns the number of buffers still queued.
    pub fn publish_end_of_stream(&self) -> Result<usize> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            return Err(HandoffError::invalid_state("publish_end_of_stream", inner.state));
        }

        inner.end_of_stream = true;
        let depth = inner.pending.len();
        drop(inner);

        debug!("'{}': reached end of stream, {} queued", self.config.name, depth);
        self.available.notify_all();
        Ok(depth)
    }

    /// Wait for the next buffer or the end of the stream
    ///
    /// Blocks while nothing is queued and the end of the stream has not been
    /// published. If the session is stopped while waiting, the call fails with
    /// [`HandoffError::InvalidState`].
    pub fn take(&self) -> Result<Take> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            return Err(HandoffError::invalid_state("take", inner.state));
        }

        let session = inner.session;
        if Self::must_wait(&inner, session) {
            inner.stats.waits += 1;
            trace!("'{}': waiting for buffer", self.config.name);
        }

        let mut inner = self
            .available
            .wait_while(inner, |inner| Self::must_wait(inner, session))
            .unwrap_or_else(PoisonError::into_inner);

        Self::pop(&mut inner, session)
    }

    /// [`take`](Self::take) with an upper bound on the wait
    ///
    /// Returns `Ok(None)` if neither a buffer nor the end of the stream showed
    /// up within `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<Take>> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            return Err(HandoffError::invalid_state("take", inner.state));
        }

        let session = inner.session;
        if Self::must_wait(&inner, session) {
            inner.stats.waits += 1;
        }

        let (mut inner, result) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| Self::must_wait(inner, session))
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && Self::must_wait(&inner, session) {
            return Ok(None);
        }
        Self::pop(&mut inner, session).map(Some)
    }

    fn must_wait(inner: &Inner, session: u64) -> bool {
        inner.session == session
            && inner.state.is_started()
            && inner.pending.is_empty()
            && !inner.end_of_stream
    }

    fn pop(inner: &mut Inner, session: u64) -> Result<Take> {
        if inner.session != session || !inner.state.is_started() {
            // The session we waited on was stopped underneath us
            return Err(HandoffError::invalid_state("take", LifecycleState::Created));
        }

        match inner.pending.pop_front() {
            Some(buffer) => {
                inner.stats.taken += 1;
                Ok(Take::Buffer(buffer))
            }
            None => Ok(Take::EndOfStream),
        }
    }

    /// End the session
    ///
    /// Releases the session pool and drops every buffer still queued: those
    /// buffers are neither returned to a pool nor handed to anyone, and their
    /// number is reported in [`StopReport::discarded`]. Call
    /// [`drain`](Self::drain) first to keep custody of them. Shared memory
    /// stays mapped until the last buffer referencing it is dropped. Blocked
    /// readers wake up with [`HandoffError::InvalidState`].
    pub fn stop(&self) -> Result<StopReport> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            debug!("'{}': stop in invalid state {}", self.config.name, inner.state);
            return Err(HandoffError::invalid_state("stop", inner.state));
        }

        let report = Self::shutdown(&mut inner, &self.config.name);
        drop(inner);

        self.available.notify_all();
        Ok(report)
    }

    fn shutdown(inner: &mut Inner, name: &str) -> StopReport {
        let pool_released = match std::mem::replace(&mut inner.pool, SessionPool::Inactive) {
            SessionPool::Inactive => false,
            SessionPool::Local(_) => true,
            SessionPool::Shared { slot, pool, .. } => Self::reset_slot(&slot, pool.is_some()),
        };

        let discarded = inner.pending.len();
        inner.pending.clear();
        inner.stats.discarded += discarded as u64;
        inner.end_of_stream = false;
        inner.state = LifecycleState::Created;

        debug!("'{}': stopped, {} buffer(s) remained", name, discarded);
        StopReport {
            discarded,
            pool_released,
        }
    }

    /// Forget the shared pool of a session without waiting on a handshake
    fn reset_slot(slot: &Mutex<SharedPoolSlot>, materialized: bool) -> bool {
        match slot.try_lock() {
            Ok(mut slot) => slot.reset().is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().reset().is_some(),
            // A handshake is in flight; it finishes on a slot nobody shares any more
            Err(TryLockError::WouldBlock) => materialized,
        }
    }

    /// Remove and return every queued buffer, oldest first
    ///
    /// The end-of-stream flag is left untouched.
    pub fn drain(&self) -> Result<Vec<Buffer>> {
        let mut inner = self.lock();

        if !inner.state.is_started() {
            return Err(HandoffError::invalid_state("drain", inner.state));
        }

        let drained: Vec<Buffer> = inner.pending.drain(..).collect();
        inner.stats.taken += drained.len() as u64;
        Ok(drained)
    }

    /// Get an empty writable buffer for the producer
    ///
    /// In sharing mode the first request of a session performs the registry
    /// handshake and builds the pool; a failed handshake is reported as
    /// [`HandoffError::PoolSetupFailed`] and retried on the next request.
    /// The handshake does not hold the queue lock. If the session is stopped
    /// meanwhile, the request fails with [`HandoffError::InvalidState`].
    pub fn request_buffer(&self) -> Result<Buffer> {
        let lookup = {
            let inner = self.lock();

            if !inner.state.is_started() {
                return Err(HandoffError::invalid_state("request_buffer", inner.state));
            }

            match &inner.pool {
                SessionPool::Local(pool) => PoolLookup::Ready(Arc::clone(pool)),
                SessionPool::Shared {
                    pool: Some(pool), ..
                } => PoolLookup::Ready(Arc::clone(pool)),
                SessionPool::Shared { sharing, slot, .. } => PoolLookup::Handshake {
                    sharing: Arc::clone(sharing),
                    slot: Arc::clone(slot),
                    session: inner.session,
                },
                SessionPool::Inactive => {
                    return Err(HandoffError::invalid_state("request_buffer", inner.state));
                }
            }
        };

        let pool = match lookup {
            PoolLookup::Ready(pool) => pool,
            PoolLookup::Handshake {
                sharing,
                slot,
                session,
            } => {
                let pool = slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_materialize(&*sharing)?;
                self.adopt_shared_pool(pool, session)?
            }
        };

        pool.acquire_slot()
    }

    /// Record a freshly materialized pool, unless its session ended meanwhile
    fn adopt_shared_pool(&self, pool: Arc<BufferPool>, session: u64) -> Result<Arc<BufferPool>> {
        let mut inner = self.lock();

        if inner.session != session || !inner.state.is_started() {
            debug!(
                "'{}': session {} ended during the shared pool handshake",
                self.config.name, session
            );
            return Err(HandoffError::invalid_state("request_buffer", inner.state));
        }

        if let SessionPool::Shared { pool: current, .. } = &mut inner.pool {
            Ok(Arc::clone(current.get_or_insert(pool)))
        } else {
            Err(HandoffError::invalid_state("request_buffer", inner.state))
        }
    }

    /// Upstream entry point: `Some` publishes, `None` ends the stream
    ///
    /// Returns the number of buffers queued afterwards.
    pub fn store_buffer(&self, buffer: Option<Buffer>) -> Result<usize> {
        match buffer {
            Some(buffer) => self.publish(buffer),
            None => self.publish_end_of_stream(),
        }
    }

    /// Downstream entry point: the next buffer, or [`HandoffError::EndOfStream`]
    pub fn read(&self) -> Result<Buffer> {
        match self.take()? {
            Take::Buffer(buffer) => Ok(buffer),
            Take::EndOfStream => Err(HandoffError::EndOfStream),
        }
    }

    /// Give a consumed buffer back to the session pool
    ///
    /// Returns `false` and drops the buffer if no session pool owns it, for
    /// instance after the session that produced it was stopped.
    pub fn release(&self, buffer: Buffer) -> bool {
        let pool = self.lock().pool.current().cloned();
        match pool {
            Some(pool) => pool.release(buffer),
            None => {
                warn!(
                    "'{}': no session pool to take back buffer {}",
                    self.config.name,
                    buffer.sequence()
                );
                false
            }
        }
    }

    /// The format descriptor supplied at construction, unmodified
    pub fn format(&self) -> Arc<FormatDescriptor> {
        Arc::clone(&self.format)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Number of buffers published and not yet taken
    pub fn queued(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.lock().end_of_stream
    }

    /// Whether buffers are negotiated with an external registry
    pub fn is_shared(&self) -> bool {
        self.source.is_shared()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats.clone()
    }

    /// Statistics of the session pool, once it exists
    pub fn pool_stats(&self) -> Option<BufferPoolStats> {
        self.lock().pool.current().map(|pool| pool.stats())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HandoffQueue {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state.is_started() {
            let report = Self::shutdown(inner, &self.config.name);
            if report.discarded > 0 {
                warn!(
                    "'{}': dropped while started, discarded {} buffer(s)",
                    self.config.name, report.discarded
                );
            }
        }
    }
}
