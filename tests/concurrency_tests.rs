//! Producer/consumer thread tests for the handoff queue

#[cfg(test)]
mod tests {
    use handoff::{
        BufferPoolConfig, BufferSharing, FormatDescriptor, HandoffError, HandoffQueue, MmapSharing,
        SharedRegion, SharingError, Take,
    };
    use std::{
        sync::{mpsc, Arc, Barrier},
        thread,
        time::Duration,
    };

    const GRACE: Duration = Duration::from_millis(100);

    fn local_queue(count: usize) -> Arc<HandoffQueue> {
        let queue = HandoffQueue::with_local_pool(
            FormatDescriptor::with_mime("test/seq"),
            BufferPoolConfig::new("threads")
                .with_buffer_size(16)
                .with_buffer_count(count),
        )
        .unwrap();
        queue.start().unwrap();
        Arc::new(queue)
    }

    /// Spawn a reader that reports the first `take` outcome over a channel
    fn spawn_reader(queue: &Arc<HandoffQueue>, barrier: &Arc<Barrier>) -> mpsc::Receiver<Result<Take, HandoffError>> {
        let (tx, rx) = mpsc::channel();
        let queue = Arc::clone(queue);
        let barrier = Arc::clone(barrier);
        thread::spawn(move || {
            barrier.wait();
            let _ = tx.send(queue.take());
        });
        rx
    }

    /// Wait until the reader is parked on the condition variable
    fn wait_for_reader(queue: &HandoffQueue) {
        // `waits` is bumped under the lock that the reader only gives up inside the wait
        for _ in 0..500 {
            if queue.stats().waits > 0 {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("reader never started waiting");
    }

    /// Registry whose `enter_sharing_mode` parks until the test lets it go
    #[derive(Debug)]
    struct GatedSharing {
        registry: MmapSharing,
        entered: Barrier,
        proceed: Barrier,
    }

    impl GatedSharing {
        fn new(count: usize, size: usize) -> Arc<Self> {
            Arc::new(Self {
                registry: MmapSharing::new(count, size),
                entered: Barrier::new(2),
                proceed: Barrier::new(2),
            })
        }
    }

    impl BufferSharing for GatedSharing {
        fn request_sharing_mode(&self) -> Result<(), SharingError> {
            self.registry.request_sharing_mode()
        }

        fn enter_sharing_mode(&self) -> Result<(), SharingError> {
            self.entered.wait();
            self.proceed.wait();
            self.registry.enter_sharing_mode()
        }

        fn query_shared_buffers(&self) -> Result<Vec<SharedRegion>, SharingError> {
            self.registry.query_shared_buffers()
        }
    }

    /// Start a gated queue and park a producer inside the registry handshake
    fn queue_in_handshake(
        sharing: &Arc<GatedSharing>,
    ) -> (Arc<HandoffQueue>, thread::JoinHandle<handoff::Result<handoff::Buffer>>) {
        let queue = Arc::new(
            HandoffQueue::with_sharing(FormatDescriptor::with_mime("test/seq"), sharing.clone())
                .unwrap(),
        );
        queue.start().unwrap();

        let producer_queue = Arc::clone(&queue);
        let producer = thread::spawn(move || producer_queue.request_buffer());
        sharing.entered.wait();
        (queue, producer)
    }

    #[test]
    fn test_end_of_stream_not_held_up_by_handshake() {
        let sharing = GatedSharing::new(2, 64);
        let (queue, producer) = queue_in_handshake(&sharing);

        let (tx, rx) = mpsc::channel();
        let signal_queue = Arc::clone(&queue);
        thread::spawn(move || {
            let depth = signal_queue.publish_end_of_stream();
            let _ = tx.send((depth, signal_queue.queued()));
        });

        let (depth, queued) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("end of stream waited on the registry");
        assert_eq!(depth.unwrap(), 0);
        assert_eq!(queued, 0);
        assert!(queue.take().unwrap().is_end_of_stream());

        sharing.proceed.wait();
        let buffer = producer.join().unwrap().unwrap();
        assert!(buffer.is_shared());
        assert!(queue.release(buffer));
    }

    #[test]
    fn test_stop_during_handshake_fails_request() {
        let sharing = GatedSharing::new(2, 64);
        let (queue, producer) = queue_in_handshake(&sharing);

        let (tx, rx) = mpsc::channel();
        let stop_queue = Arc::clone(&queue);
        thread::spawn(move || {
            let _ = tx.send(stop_queue.stop());
        });

        let report = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("stop waited on the registry")
            .unwrap();
        assert!(!report.pool_released);

        sharing.proceed.wait();
        let outcome = producer.join().unwrap();
        assert!(matches!(outcome, Err(HandoffError::InvalidState { .. })));
        assert!(queue.pool_stats().is_none());
    }

    #[test]
    fn test_take_blocks_until_publish() {
        let queue = local_queue(1);
        let barrier = Arc::new(Barrier::new(2));
        let rx = spawn_reader(&queue, &barrier);

        barrier.wait();
        wait_for_reader(&queue);
        assert!(rx.recv_timeout(GRACE).is_err(), "take returned on an empty queue");

        let mut buffer = queue.request_buffer().unwrap();
        buffer.fill(b"wake").unwrap();
        queue.publish(buffer).unwrap();

        let taken = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(taken.into_buffer().unwrap().as_slice(), b"wake");
    }

    #[test]
    fn test_take_blocks_until_end_of_stream() {
        let queue = local_queue(1);
        let barrier = Arc::new(Barrier::new(2));
        let rx = spawn_reader(&queue, &barrier);

        barrier.wait();
        wait_for_reader(&queue);
        assert!(rx.recv_timeout(GRACE).is_err());

        queue.publish_end_of_stream().unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(outcome.is_end_of_stream());
    }

    #[test]
    fn test_stop_wakes_blocked_reader() {
        let queue = local_queue(1);
        let barrier = Arc::new(Barrier::new(2));
        let rx = spawn_reader(&queue, &barrier);

        barrier.wait();
        wait_for_reader(&queue);
        assert!(rx.recv_timeout(GRACE).is_err());

        queue.stop().unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(HandoffError::InvalidState { .. })));
    }

    #[test]
    fn test_restart_does_not_satisfy_old_waiter() {
        let queue = local_queue(1);
        let barrier = Arc::new(Barrier::new(2));
        let rx = spawn_reader(&queue, &barrier);

        barrier.wait();
        wait_for_reader(&queue);
        assert!(rx.recv_timeout(GRACE).is_err());

        queue.stop().unwrap();
        queue.start().unwrap();
        queue.publish(queue.request_buffer().unwrap()).unwrap();

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(HandoffError::InvalidState { .. })));
        // The buffer published in the new session is still there
        assert_eq!(queue.queued(), 1);
    }

    #[test]
    fn test_producer_consumer_preserve_order() {
        const FRAMES: u32 = 2_000;

        let registry = Arc::new(MmapSharing::new(4, 64));
        let queue = Arc::new(
            HandoffQueue::with_sharing(FormatDescriptor::with_mime("test/seq"), registry).unwrap(),
        );
        queue.start().unwrap();

        let consumer_queue = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            loop {
                match consumer_queue.read() {
                    Ok(buffer) => {
                        let mut bytes = [0u8; 4];
                        bytes.copy_from_slice(buffer.as_slice());
                        seen.push(u32::from_le_bytes(bytes));
                        assert!(consumer_queue.release(buffer));
                    }
                    Err(e) if e.is_end_of_stream() => return seen,
                    Err(e) => panic!("unexpected read error: {}", e),
                }
            }
        });

        for frame in 0..FRAMES {
            let mut buffer = loop {
                match queue.request_buffer() {
                    Ok(buffer) => break buffer,
                    Err(HandoffError::PoolExhausted { .. }) => thread::yield_now(),
                    Err(e) => panic!("unexpected request error: {}", e),
                }
            };
            buffer.fill(&frame.to_le_bytes()).unwrap();
            queue.store_buffer(Some(buffer)).unwrap();
        }
        queue.store_buffer(None).unwrap();

        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..FRAMES).collect::<Vec<_>>());

        let stats = queue.stats();
        assert_eq!(stats.published, FRAMES as u64);
        assert_eq!(stats.taken, FRAMES as u64);
        assert!(stats.peak_depth <= 4);

        let pool = queue.pool_stats().unwrap();
        assert_eq!(pool.currently_in_use, 0);
        assert_eq!(queue.stop().unwrap().discarded, 0);
    }
}
