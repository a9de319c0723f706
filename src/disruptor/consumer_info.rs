//! Consumer nodes of the dependency graph
//!
//! A node owns one or more sequences, the barrier it reads through and its
//! end-of-chain flag. While a node is at the end of a chain its sequences sit
//! in the producer's gating set; once a later node depends on it, the
//! downstream node bounds the producer instead and the interior node's
//! sequences are removed.

use crate::disruptor::{
    EventProcessor, Executor, Result, Sequence, SequenceBarrier, Sequencer, WorkerPool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// A consumer registered in the dependency graph
pub trait ConsumerInfo: Send + Sync {
    /// Every sequence the node advances; its progress is their minimum
    fn sequences(&self) -> Vec<Arc<Sequence>>;

    /// The barrier the node reads through
    fn barrier(&self) -> Arc<dyn SequenceBarrier>;

    /// True while no other node depends on this one
    fn is_end_of_chain(&self) -> bool;

    /// Submit the node's processing loop(s) to `executor`
    ///
    /// # Errors
    /// Returns [`DisruptorError::AlreadyRunning`](crate::disruptor::DisruptorError::AlreadyRunning)
    /// if already started, or the executor's error if a task could not be
    /// spawned (the node is halted again in that case).
    fn start(&self, executor: &dyn Executor) -> Result<()>;

    /// Cooperatively stop the node
    fn halt(&self);

    /// Record that a downstream node now gates on this one
    ///
    /// The first call clears the end-of-chain flag and removes the node's
    /// sequences from the gating set; later calls do nothing.
    fn mark_as_used_in_barrier(&self);

    fn is_running(&self) -> bool;

    /// Minimum of the node's sequences
    fn progress(&self) -> i64 {
        Sequence::get_minimum_sequence(&self.sequences(), i64::MAX)
    }
}

fn release_gating(sequencer: &dyn Sequencer, sequences: &[Arc<Sequence>]) {
    for sequence in sequences {
        sequencer.remove_gating_sequence(sequence);
    }
}

fn spawn_processor(processor: &Arc<dyn EventProcessor>, executor: &dyn Executor) -> Result<()> {
    processor.mark_started()?;

    let task_processor = Arc::clone(processor);
    let submitted = executor.execute(Box::new(move || {
        if let Err(error) = task_processor.run() {
            error!(
                sequence = task_processor.sequence().get(),
                %error,
                "consumer stopped with error"
            );
        }
    }));

    if submitted.is_err() {
        processor.halt();
    }
    submitted
}

/// Node wrapping a single [`EventProcessor`]
pub struct EventProcessorInfo {
    processor: Arc<dyn EventProcessor>,
    barrier: Arc<dyn SequenceBarrier>,
    sequencer: Arc<dyn Sequencer>,
    end_of_chain: AtomicBool,
}

impl EventProcessorInfo {
    /// Wrap `processor` and add its sequence to the gating set
    pub fn new(
        processor: Arc<dyn EventProcessor>,
        barrier: Arc<dyn SequenceBarrier>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        sequencer.add_gating_sequences(&[processor.sequence()]);
        Self {
            processor,
            barrier,
            sequencer,
            end_of_chain: AtomicBool::new(true),
        }
    }

    pub fn processor(&self) -> &Arc<dyn EventProcessor> {
        &self.processor
    }
}

impl ConsumerInfo for EventProcessorInfo {
    fn sequences(&self) -> Vec<Arc<Sequence>> {
        vec![self.processor.sequence()]
    }

    fn barrier(&self) -> Arc<dyn SequenceBarrier> {
        Arc::clone(&self.barrier)
    }

    fn is_end_of_chain(&self) -> bool {
        self.end_of_chain.load(Ordering::Acquire)
    }

    fn start(&self, executor: &dyn Executor) -> Result<()> {
        spawn_processor(&self.processor, executor)
    }

    fn halt(&self) {
        self.processor.halt();
    }

    fn mark_as_used_in_barrier(&self) {
        if self.end_of_chain.swap(false, Ordering::AcqRel) {
            release_gating(self.sequencer.as_ref(), &self.sequences());
            debug!(
                sequence = self.processor.sequence().get(),
                "processor no longer end of chain"
            );
        }
    }

    fn is_running(&self) -> bool {
        self.processor.is_running()
    }
}

/// Node wrapping a [`WorkerPool`]
pub struct WorkerPoolInfo {
    pool: WorkerPool,
    barrier: Arc<dyn SequenceBarrier>,
    sequencer: Arc<dyn Sequencer>,
    end_of_chain: AtomicBool,
}

impl WorkerPoolInfo {
    /// Wrap `pool` and add all its sequences to the gating set
    pub fn new(
        pool: WorkerPool,
        barrier: Arc<dyn SequenceBarrier>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        sequencer.add_gating_sequences(&pool.worker_sequences());
        Self {
            pool,
            barrier,
            sequencer,
            end_of_chain: AtomicBool::new(true),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl ConsumerInfo for WorkerPoolInfo {
    fn sequences(&self) -> Vec<Arc<Sequence>> {
        self.pool.worker_sequences()
    }

    fn barrier(&self) -> Arc<dyn SequenceBarrier> {
        Arc::clone(&self.barrier)
    }

    fn is_end_of_chain(&self) -> bool {
        self.end_of_chain.load(Ordering::Acquire)
    }

    fn start(&self, executor: &dyn Executor) -> Result<()> {
        for worker in self.pool.workers() {
            if let Err(error) = spawn_processor(worker, executor) {
                self.pool.halt();
                return Err(error);
            }
        }
        Ok(())
    }

    fn halt(&self) {
        self.pool.halt();
    }

    fn mark_as_used_in_barrier(&self) {
        if self.end_of_chain.swap(false, Ordering::AcqRel) {
            release_gating(self.sequencer.as_ref(), &self.sequences());
            debug!(workers = self.pool.len(), "worker pool no longer end of chain");
        }
    }

    fn is_running(&self) -> bool {
        self.pool.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BatchEventProcessor, BlockingWaitStrategy, ClosureWorkHandler, DataProvider,
        DefaultEventFactory, DisruptorError, FatalExceptionHandler, NoOpEventHandler,
        RingBuffer, Task, ThreadExecutor,
    };

    struct RejectingExecutor;

    impl Executor for RejectingExecutor {
        fn execute(&self, _task: Task) -> Result<()> {
            Err(DisruptorError::Spawn(std::io::Error::from(
                std::io::ErrorKind::WouldBlock,
            )))
        }
    }

    fn ring() -> Arc<RingBuffer<u64>> {
        Arc::new(
            RingBuffer::create_single_producer(
                DefaultEventFactory::new(),
                16,
                Arc::new(BlockingWaitStrategy::new()),
            )
            .unwrap(),
        )
    }

    fn processor_node(ring_buffer: &Arc<RingBuffer<u64>>) -> EventProcessorInfo {
        let barrier = ring_buffer.new_barrier(&[]);
        let processor = BatchEventProcessor::new(
            Arc::clone(ring_buffer) as Arc<dyn DataProvider<u64>>,
            Arc::clone(&barrier),
            NoOpEventHandler::new(),
        );
        EventProcessorInfo::new(Arc::new(processor), barrier, ring_buffer.sequencer())
    }

    #[test]
    fn test_construction_adds_gating_sequence() {
        let ring_buffer = ring();
        let node = processor_node(&ring_buffer);

        assert!(node.is_end_of_chain());
        let gating = ring_buffer.sequencer().gating_sequences();
        assert_eq!(gating.len(), 1);
        assert!(Arc::ptr_eq(&gating[0], &node.sequences()[0]));
    }

    #[test]
    fn test_mark_as_used_in_barrier_is_idempotent() {
        let ring_buffer = ring();
        let node = processor_node(&ring_buffer);
        let other = processor_node(&ring_buffer);

        node.mark_as_used_in_barrier();
        assert!(!node.is_end_of_chain());
        assert_eq!(ring_buffer.sequencer().gating_sequences().len(), 1);

        node.mark_as_used_in_barrier();
        assert_eq!(ring_buffer.sequencer().gating_sequences().len(), 1);
        assert!(other.is_end_of_chain());
    }

    #[test]
    fn test_start_and_halt_on_executor() {
        let ring_buffer = ring();
        let node = processor_node(&ring_buffer);
        let executor = ThreadExecutor::new("node-test");

        node.start(&executor).unwrap();
        assert!(node.is_running());
        assert!(matches!(
            node.start(&executor),
            Err(DisruptorError::AlreadyRunning)
        ));

        ring_buffer.publish_event(|slot, _| *slot = 1).unwrap();
        node.halt();
        executor.join_all().unwrap();
        assert!(!node.is_running());
    }

    #[test]
    fn test_failed_spawn_leaves_node_stopped() {
        let ring_buffer = ring();
        let node = processor_node(&ring_buffer);

        assert!(matches!(
            node.start(&RejectingExecutor),
            Err(DisruptorError::Spawn(_))
        ));
        assert!(!node.is_running());
    }

    #[test]
    fn test_worker_pool_node_gates_on_every_sequence() {
        let ring_buffer = ring();
        let handlers: Vec<_> = (0..2)
            .map(|_| ClosureWorkHandler::new(|_: &u64| Ok(())))
            .collect();
        let barrier = ring_buffer.new_barrier(&[]);
        let pool = WorkerPool::new(
            Arc::clone(&ring_buffer) as Arc<dyn DataProvider<u64>>,
            Arc::clone(&barrier),
            Arc::new(FatalExceptionHandler::new()),
            handlers,
        )
        .unwrap();
        let node = WorkerPoolInfo::new(pool, barrier, ring_buffer.sequencer());

        assert_eq!(node.sequences().len(), 3);
        assert_eq!(ring_buffer.sequencer().gating_sequences().len(), 3);
        assert_eq!(node.progress(), -1);

        node.mark_as_used_in_barrier();
        assert!(ring_buffer.sequencer().gating_sequences().is_empty());
    }
}
