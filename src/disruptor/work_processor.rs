//! Worker pools
//!
//! A worker pool is a single logical consumer made of several processors that
//! share a work sequence. Each worker claims the next sequence by CAS on it,
//! so every event is handled by exactly one worker of the pool.

use crate::disruptor::event_processor::Lifecycle;
use crate::disruptor::{
    DataProvider, DisruptorError, EventProcessor, ExceptionHandler, ProcessorState, Result,
    Sequence, SequenceBarrier, WorkHandler,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// One worker of a [`WorkerPool`]
pub struct WorkProcessor<T, H> {
    data_provider: Arc<dyn DataProvider<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    sequence: Arc<Sequence>,
    work_sequence: Arc<Sequence>,
    lifecycle: Lifecycle,
}

impl<T, H> WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    pub fn new(
        data_provider: Arc<dyn DataProvider<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        handler: H,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            data_provider,
            barrier,
            handler: Mutex::new(handler),
            exception_handler,
            sequence: Arc::new(Sequence::default()),
            work_sequence,
            lifecycle: Lifecycle::new(),
        }
    }

    fn process_events(&self, handler: &mut H) -> Result<()> {
        let mut processed_sequence = true;
        let mut cached_available_sequence = i64::MIN;
        let mut next_sequence = self.sequence.get();

        while self.lifecycle.is_processing() {
            if processed_sequence {
                processed_sequence = false;
                loop {
                    next_sequence = self.work_sequence.get() + 1;
                    self.sequence.set(next_sequence - 1);
                    if self
                        .work_sequence
                        .compare_and_set(next_sequence - 1, next_sequence)
                    {
                        break;
                    }
                }
            }

            if cached_available_sequence >= next_sequence {
                // SAFETY: the barrier reported the sequence as published and
                // this worker's sequence still gates it.
                let event = unsafe { self.data_provider.get(next_sequence) };
                if let Err(error) = handler.on_event(event) {
                    if let Err(fatal) =
                        self.exception_handler
                            .handle_event_exception(error, next_sequence, event)
                    {
                        warn!(
                            sequence = next_sequence,
                            error = %fatal,
                            "halting worker after escalated error"
                        );
                        return Err(fatal);
                    }
                }
                processed_sequence = true;
            } else {
                match self.barrier.wait_for(next_sequence) {
                    Ok(available) => cached_available_sequence = available,
                    Err(DisruptorError::Timeout) => {}
                    Err(DisruptorError::Alert) => {
                        if !self.lifecycle.is_processing() {
                            break;
                        }
                        self.barrier.clear_alert();
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        Ok(())
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(error) = handler.on_start() {
            self.exception_handler.handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(error);
        }
    }
}

impl<T, H> EventProcessor for WorkProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: WorkHandler<T>,
{
    fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn mark_started(&self) -> Result<()> {
        self.lifecycle.mark_started()
    }

    fn run(&self) -> Result<()> {
        let entered = self.lifecycle.enter_running()?;
        let mut handler = self.handler.lock();
        if !entered {
            self.notify_start(&mut handler);
            self.notify_shutdown(&mut handler);
            return Ok(());
        }

        self.barrier.clear_alert();
        self.notify_start(&mut handler);
        debug!(sequence = self.sequence.get(), "worker running");

        let result = self.process_events(&mut handler);

        self.notify_shutdown(&mut handler);
        self.lifecycle.exit();
        debug!(sequence = self.sequence.get(), "worker stopped");
        result
    }

    fn halt(&self) {
        self.lifecycle.halt();
        self.barrier.alert();
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn state(&self) -> ProcessorState {
        self.lifecycle.state()
    }
}

/// A group of [`WorkProcessor`]s acting as one consumer
///
/// Its progress is the minimum of every worker sequence and the shared work
/// sequence; downstream consumers and the producer gate on all of them.
pub struct WorkerPool {
    work_sequence: Arc<Sequence>,
    workers: Vec<Arc<dyn EventProcessor>>,
}

impl WorkerPool {
    /// Create one worker per handler, all reading through `barrier`
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidConfiguration`] for an empty handler
    /// list.
    pub fn new<T, H>(
        data_provider: Arc<dyn DataProvider<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        exception_handler: Arc<dyn ExceptionHandler<T>>,
        handlers: Vec<H>,
    ) -> Result<Self>
    where
        T: Send + Sync + 'static,
        H: WorkHandler<T> + 'static,
    {
        if handlers.is_empty() {
            return Err(DisruptorError::InvalidConfiguration(
                "a worker pool needs at least one handler".to_string(),
            ));
        }

        let work_sequence = Arc::new(Sequence::default());
        let workers = handlers
            .into_iter()
            .map(|handler| {
                Arc::new(WorkProcessor::new(
                    Arc::clone(&data_provider),
                    Arc::clone(&barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                )) as Arc<dyn EventProcessor>
            })
            .collect();

        Ok(Self {
            work_sequence,
            workers,
        })
    }

    /// Every worker sequence followed by the shared work sequence
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.workers
            .iter()
            .map(|worker| worker.sequence())
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    pub fn work_sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.work_sequence)
    }

    pub fn workers(&self) -> &[Arc<dyn EventProcessor>] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Halt every worker
    pub fn halt(&self) {
        for worker in &self.workers {
            worker.halt();
        }
    }

    /// True while every worker is started or running
    ///
    /// The pool's progress is bounded by its slowest worker, so one stopped
    /// worker stalls the whole pool.
    pub fn is_running(&self) -> bool {
        self.workers.iter().all(|worker| worker.is_running())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("work_sequence", &self.work_sequence.get())
            .finish()
    }
}
