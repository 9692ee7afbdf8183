//! Tests for local and shared buffer pools

#[cfg(test)]
mod tests {
    use handoff::{
        BufferPool, BufferPoolConfigBuilder, FormatDescriptor, HandoffError, HandoffQueue,
        BufferSharing, MmapSharing, PoolSource, QueueConfig,
    };
    use std::sync::Arc;

    fn shared_queue(registry: &Arc<MmapSharing>, config: QueueConfig) -> HandoffQueue {
        HandoffQueue::new(
            FormatDescriptor::with_mime("video/avc"),
            PoolSource::Shared(registry.clone()),
            config,
        )
        .expect("Failed to create queue")
    }

    #[test]
    fn test_pool_exhaustion_after_capacity() {
        let config = BufferPoolConfigBuilder::new("exhaust")
            .buffer_size(128)
            .buffer_count(4)
            .build()
            .unwrap();
        let pool = BufferPool::local(&config).unwrap();

        let held: Vec<_> = (0..4).map(|_| pool.acquire_slot().unwrap()).collect();
        assert_eq!(pool.in_use(), 4);

        let err = pool.acquire_slot().unwrap_err();
        assert!(matches!(err, HandoffError::PoolExhausted { capacity: 4 }));

        for buffer in held {
            assert!(pool.release(buffer));
        }
        assert_eq!(pool.available(), 4);

        let stats = pool.stats();
        assert_eq!(stats.total_acquisitions, 4);
        assert_eq!(stats.total_releases, 4);
        assert_eq!(stats.peak_usage, 4);
    }

    #[test]
    fn test_shared_pool_materializes_on_first_request() {
        let registry = Arc::new(MmapSharing::new(3, 512));
        let queue = shared_queue(&registry, QueueConfig::new("lazy"));
        queue.start().unwrap();

        // Starting only asks for the mode; the buffers come on demand
        assert_eq!(registry.mode_requests(), 1);
        assert_eq!(registry.enter_calls(), 0);
        assert!(queue.pool_stats().is_none());

        let buffer = queue.request_buffer().unwrap();
        assert!(buffer.is_shared());
        assert_eq!(buffer.capacity(), 512);
        assert_eq!(registry.enter_calls(), 1);
        assert_eq!(registry.query_calls(), 1);

        let _second = queue.request_buffer().unwrap();
        assert_eq!(registry.enter_calls(), 1);
        assert_eq!(queue.pool_stats().unwrap().capacity, 3);
    }

    #[test]
    fn test_shared_pool_exhaustion() {
        let registry = Arc::new(MmapSharing::new(2, 64));
        let queue = shared_queue(&registry, QueueConfig::new("tight"));
        queue.start().unwrap();

        let a = queue.request_buffer().unwrap();
        let _b = queue.request_buffer().unwrap();
        assert!(matches!(
            queue.request_buffer(),
            Err(HandoffError::PoolExhausted { capacity: 2 })
        ));

        assert!(queue.release(a));
        assert!(queue.request_buffer().is_ok());
    }

    #[test]
    fn test_failed_setup_leaves_no_pool_and_retries() {
        let registry = Arc::new(MmapSharing::new(2, 64));
        registry.set_fail_enter(true);
        let queue = shared_queue(&registry, QueueConfig::new("retry"));
        queue.start().unwrap();

        let err = queue.request_buffer().unwrap_err();
        assert!(matches!(err, HandoffError::PoolSetupFailed { stage: "enter", .. }));
        assert!(queue.pool_stats().is_none());

        registry.set_fail_enter(false);
        registry.set_fail_query(true);
        let err = queue.request_buffer().unwrap_err();
        assert!(matches!(err, HandoffError::PoolSetupFailed { stage: "query", .. }));
        assert!(queue.pool_stats().is_none());

        registry.set_fail_query(false);
        assert!(queue.request_buffer().is_ok());
        assert_eq!(registry.enter_calls(), 3);
    }

    #[test]
    fn test_setup_retry_limit_is_per_session() {
        let registry = Arc::new(MmapSharing::new(2, 64));
        registry.set_fail_query(true);
        let queue = shared_queue(
            &registry,
            QueueConfig::new("limited").with_max_setup_attempts(Some(1)),
        );
        queue.start().unwrap();

        assert!(queue.request_buffer().is_err());
        registry.set_fail_query(false);
        let err = queue.request_buffer().unwrap_err();
        assert!(matches!(err, HandoffError::PoolSetupFailed { stage: "retry", .. }));
        assert_eq!(registry.query_calls(), 1);

        // A new session starts with a clean slate
        queue.stop().unwrap();
        queue.start().unwrap();
        assert!(queue.request_buffer().is_ok());
    }

    #[test]
    fn test_stop_releases_shared_pool() {
        let registry = Arc::new(MmapSharing::new(2, 64));
        let queue = shared_queue(&registry, QueueConfig::new("release"));
        queue.start().unwrap();

        let buffer = queue.request_buffer().unwrap();
        queue.publish(buffer).unwrap();

        let report = queue.stop().unwrap();
        assert!(report.pool_released);
        assert_eq!(report.discarded, 1);
        assert!(queue.pool_stats().is_none());

        // The next session negotiates a fresh pool
        queue.start().unwrap();
        queue.request_buffer().unwrap();
        assert_eq!(registry.enter_calls(), 2);
    }

    #[test]
    fn test_buffer_from_another_pool_is_not_absorbed() {
        let registry = Arc::new(MmapSharing::new(1, 64));
        let queue = shared_queue(&registry, QueueConfig::new("owner"));
        queue.start().unwrap();
        queue.request_buffer().unwrap();

        let config = BufferPoolConfigBuilder::new("other").buffer_count(1).build().unwrap();
        let other = BufferPool::local(&config).unwrap();
        let stranger = other.acquire_slot().unwrap();

        assert!(!queue.release(stranger));
        assert_eq!(queue.pool_stats().unwrap().foreign_releases, 1);
    }

    #[test]
    fn test_shared_buffers_cannot_be_claimed_twice() {
        let registry = Arc::new(MmapSharing::new(2, 64));
        let queue = shared_queue(&registry, QueueConfig::new("exclusive"));
        queue.start().unwrap();

        let mut held = queue.request_buffer().unwrap();
        held.fill(b"AAAA").unwrap();

        // The queue's pool took the regions; nobody else gets a second copy
        assert!(registry.query_shared_buffers().is_err());

        let mut other = queue.request_buffer().unwrap();
        other.fill(b"BBBB").unwrap();
        assert_eq!(held.as_slice(), b"AAAA");

        queue.stop().unwrap();
        assert!(registry.is_mapped());
        drop(held);
        drop(other);
        assert!(!registry.is_mapped());
    }
}
