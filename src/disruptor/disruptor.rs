//! Disruptor
//!
//! Owner of a ring buffer and the dependency graph of consumers reading from
//! it. Consumers are registered downstream of zero or more earlier consumers;
//! the graph decides which barrier each one reads through and which sequences
//! gate the producers.

use crate::disruptor::{
    BatchEventProcessor, ConsumerId, ConsumerInfo, ConsumerRepository, DataProvider,
    DisruptorConfig, DisruptorError, EventFactory, EventHandler, EventProcessorInfo,
    ExceptionHandler, Executor, FatalExceptionHandler, ProducerType, Result, RingBuffer,
    WaitStrategy, WorkHandler, WorkerPool, WorkerPoolInfo,
};
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A ring buffer plus its consumer graph
///
/// # Examples
/// ```
/// use chainring::disruptor::{
///     BlockingWaitStrategy, ClosureEventHandler, DefaultEventFactory, Disruptor,
///     ProducerType, ThreadExecutor,
/// };
/// use std::sync::Arc;
///
/// let executor = Arc::new(ThreadExecutor::new("doc"));
/// let mut disruptor = Disruptor::new(
///     DefaultEventFactory::<u64>::new(),
///     64,
///     ProducerType::Single,
///     Arc::new(BlockingWaitStrategy::new()),
///     executor.clone(),
/// )
/// .unwrap();
///
/// let journal = disruptor
///     .handle_events_with(ClosureEventHandler::new(|_: &u64, _, _| Ok(())), &[])
///     .unwrap();
/// disruptor
///     .handle_events_with(ClosureEventHandler::new(|_: &u64, _, _| Ok(())), &[journal])
///     .unwrap();
///
/// disruptor.start().unwrap();
/// disruptor.publish_event(|slot, sequence| *slot = sequence as u64).unwrap();
/// disruptor.shutdown(None).unwrap();
/// executor.join_all().unwrap();
/// ```
pub struct Disruptor<T> {
    ring_buffer: Arc<RingBuffer<T>>,
    executor: Arc<dyn Executor>,
    repository: ConsumerRepository,
    default_exception_handler: Arc<dyn ExceptionHandler<T>>,
    started: AtomicBool,
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    /// Create a disruptor whose consumers will run on `executor`
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidBufferSize`] if `buffer_size` is not a
    /// power of two.
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        producer_type: ProducerType,
        wait_strategy: Arc<dyn WaitStrategy>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        let ring_buffer = RingBuffer::new(event_factory, buffer_size, producer_type, wait_strategy)?;
        debug!(buffer_size, %producer_type, "created disruptor");

        Ok(Self {
            ring_buffer: Arc::new(ring_buffer),
            executor,
            repository: ConsumerRepository::new(),
            default_exception_handler: Arc::new(FatalExceptionHandler::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Create a disruptor from a validated [`DisruptorConfig`]
    pub fn from_config<F>(
        event_factory: F,
        config: &DisruptorConfig,
        executor: Arc<dyn Executor>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        config.validate()?;
        Self::new(
            event_factory,
            config.buffer_size,
            config.producer_type,
            config.build_wait_strategy(),
            executor,
        )
    }

    /// Exception handler for consumers registered from now on
    pub fn set_default_exception_handler(&mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) {
        self.default_exception_handler = exception_handler;
    }

    /// Add a batch event processor reading after `after`
    ///
    /// With an empty `after` the processor reads straight off the cursor.
    ///
    /// # Errors
    /// Returns [`DisruptorError::AlreadyStarted`] once the disruptor runs and
    /// [`DisruptorError::UnknownConsumer`] for an unregistered upstream id.
    pub fn handle_events_with<H>(&mut self, handler: H, after: &[ConsumerId]) -> Result<ConsumerId>
    where
        H: EventHandler<T> + 'static,
    {
        self.ensure_not_started()?;
        let barrier = self
            .ring_buffer
            .new_barrier(&self.repository.sequences_for(after)?);

        let processor = BatchEventProcessor::new(
            Arc::clone(&self.ring_buffer) as Arc<dyn DataProvider<T>>,
            Arc::clone(&barrier),
            handler,
        )
        .with_exception_handler(Arc::clone(&self.default_exception_handler));

        let info = EventProcessorInfo::new(Arc::new(processor), barrier, self.ring_buffer.sequencer());
        self.repository.register(Arc::new(info), after)
    }

    /// Add a worker pool reading after `after`
    ///
    /// Every event is handled by exactly one of `handlers`.
    pub fn handle_events_with_worker_pool<H>(
        &mut self,
        handlers: Vec<H>,
        after: &[ConsumerId],
    ) -> Result<ConsumerId>
    where
        H: WorkHandler<T> + 'static,
    {
        self.ensure_not_started()?;
        let barrier = self
            .ring_buffer
            .new_barrier(&self.repository.sequences_for(after)?);

        let pool = WorkerPool::new(
            Arc::clone(&self.ring_buffer) as Arc<dyn DataProvider<T>>,
            Arc::clone(&barrier),
            Arc::clone(&self.default_exception_handler),
            handlers,
        )?;

        let info = WorkerPoolInfo::new(pool, barrier, self.ring_buffer.sequencer());
        self.repository.register(Arc::new(info), after)
    }

    /// Register a consumer built outside the disruptor
    ///
    /// The node must read through a barrier on the sequences of `after` and
    /// must already have added its sequences to the gating set.
    pub fn register_consumer(
        &mut self,
        info: Arc<dyn ConsumerInfo>,
        after: &[ConsumerId],
    ) -> Result<ConsumerId> {
        self.ensure_not_started()?;
        self.repository.register(info, after)
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(DisruptorError::AlreadyStarted);
        }
        Ok(())
    }

    /// Submit every consumer to the executor, in registration order
    ///
    /// # Errors
    /// Returns [`DisruptorError::AlreadyStarted`] on a second call. If a
    /// consumer fails to start, the ones already started are halted and the
    /// error is returned.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DisruptorError::AlreadyStarted);
        }

        for (id, info) in self.repository.iter() {
            if let Err(error) = info.start(self.executor.as_ref()) {
                warn!(consumer = id.index(), %error, "consumer failed to start");
                self.halt();
                return Err(error);
            }
            debug!(consumer = id.index(), "started consumer");
        }
        Ok(())
    }

    /// Halt every consumer, downstream consumers first
    ///
    /// Events not yet processed stay unprocessed; see [`Disruptor::shutdown`].
    pub fn halt(&self) {
        for (id, info) in self.repository.iter().rev() {
            info.halt();
            debug!(consumer = id.index(), "halted consumer");
        }
    }

    /// Wait until every end-of-chain consumer has caught up with the cursor,
    /// then halt
    ///
    /// With no timeout this waits for as long as the consumers keep running.
    ///
    /// # Errors
    /// Returns [`DisruptorError::Timeout`] if the consumers did not drain in
    /// time, or [`DisruptorError::HaltedConsumer`] as soon as an end-of-chain
    /// consumer with a backlog is found stopped. Nothing is halted in either
    /// case.
    pub fn shutdown(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let backoff = Backoff::new();

        loop {
            let cursor = self.ring_buffer.cursor();
            if !self.repository.has_backlog(cursor) {
                break;
            }
            if let Some(error) = self.halted_consumer(cursor) {
                return Err(error);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(cursor, "shutdown timed out with backlog");
                return Err(DisruptorError::Timeout);
            }
            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }

        self.halt();
        Ok(())
    }

    /// Check that the graph can still make progress
    ///
    /// # Errors
    /// Returns [`DisruptorError::HaltedDependency`] for the first halted
    /// consumer that still has running dependents; they can never make
    /// progress again. Otherwise returns [`DisruptorError::HaltedConsumer`]
    /// for the first halted end-of-chain consumer behind the cursor, which
    /// producers will block on once the buffer wraps.
    pub fn check_consumers(&self) -> Result<()> {
        let stalled = self.repository.stalled_dependents();
        if let Some((consumer, dependents)) = stalled.into_iter().next() {
            warn!(
                consumer = consumer.index(),
                ?dependents,
                "halted consumer has running dependents"
            );
            return Err(DisruptorError::HaltedDependency {
                consumer: consumer.index(),
                dependents: dependents.iter().map(|id| id.index()).collect(),
            });
        }

        match self.halted_consumer(self.ring_buffer.cursor()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn halted_consumer(&self, cursor: i64) -> Option<DisruptorError> {
        let halted = self.repository.halted_with_backlog(cursor);
        let (consumer, progress) = halted.into_iter().next()?;
        warn!(
            consumer = consumer.index(),
            progress,
            cursor,
            "end-of-chain consumer halted with backlog"
        );
        Some(DisruptorError::HaltedConsumer {
            consumer: consumer.index(),
            progress,
            cursor,
        })
    }

    /// Halt every consumer downstream of `id`
    ///
    /// # Returns
    /// The halted consumers in registration order
    pub fn halt_dependents_of(&self, id: ConsumerId) -> Result<Vec<ConsumerId>> {
        self.repository.upstream_of(id)?;

        let downstream = self.repository.downstream_of(id);
        for dependent in &downstream {
            if let Some(info) = self.repository.get(*dependent) {
                info.halt();
            }
        }
        debug!(consumer = id.index(), halted = ?downstream, "halted downstream consumers");
        Ok(downstream)
    }

    /// Claim a slot, fill it and publish it; blocks while the buffer is full
    pub fn publish_event<F>(&self, translator: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.ring_buffer.publish_event(translator)
    }

    /// Like [`Disruptor::publish_event`] but fails with
    /// [`DisruptorError::InsufficientCapacity`] instead of blocking
    pub fn try_publish_event<F>(&self, translator: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.ring_buffer.try_publish_event(translator)
    }

    pub fn publish_events<I, F>(&self, items: I, translator: F) -> Result<i64>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(&mut T, i64, I::Item),
    {
        self.ring_buffer.publish_events(items, translator)
    }

    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring_buffer
    }

    pub fn consumer(&self, id: ConsumerId) -> Option<&Arc<dyn ConsumerInfo>> {
        self.repository.get(id)
    }

    pub fn repository(&self) -> &ConsumerRepository {
        &self.repository
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn cursor(&self) -> i64 {
        self.ring_buffer.cursor()
    }

    pub fn buffer_size(&self) -> usize {
        self.ring_buffer.buffer_size()
    }
}

impl<T> Drop for Disruptor<T> {
    fn drop(&mut self) {
        // Consumer tasks own references to the ring buffer; only a halt stops them.
        if self.started.load(Ordering::Acquire) {
            for (_, info) in self.repository.iter().rev() {
                info.halt();
            }
        }
    }
}

impl<T> std::fmt::Debug for Disruptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("ring_buffer", &self.ring_buffer)
            .field("consumers", &self.repository)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}
