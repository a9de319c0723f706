//! Event Processor implementation
//!
//! An event processor is the loop that drives one consumer: it waits on its
//! barrier, hands the available events to its handler and then advances its
//! own sequence, which is what downstream barriers and the producer's gating
//! set observe.

use crate::disruptor::{
    DataProvider, DisruptorError, EventHandler, ExceptionHandler, FatalExceptionHandler, Result,
    Sequence, SequenceBarrier,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of an event processor
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Created, never started
    Idle = 0,
    /// Submitted to an executor, `run` not entered yet
    Started = 1,
    /// Inside the processing loop
    Running = 2,
    /// Halt requested while the loop is still inside `run`
    Halting = 3,
    /// Loop exited, or halted before it was entered; may be started again
    Halted = 4,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessorState::Idle,
            1 => ProcessorState::Started,
            2 => ProcessorState::Running,
            3 => ProcessorState::Halting,
            _ => ProcessorState::Halted,
        }
    }
}

/// Atomic lifecycle shared by the processor implementations
///
/// Only the thread inside `run` moves the state out of `Running` or
/// `Halting`, so a restart can never be overwritten by a loop that is still
/// on its way out.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ProcessorState::Idle as u8),
        }
    }

    pub(crate) fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ProcessorState, to: ProcessorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Idle or Halted -> Started
    ///
    /// A processor whose previous loop is still halting is rejected.
    pub(crate) fn mark_started(&self) -> Result<()> {
        loop {
            let current = self.state();
            match current {
                ProcessorState::Idle | ProcessorState::Halted => {
                    if self.transition(current, ProcessorState::Started) {
                        return Ok(());
                    }
                }
                ProcessorState::Started | ProcessorState::Running | ProcessorState::Halting => {
                    return Err(DisruptorError::AlreadyRunning)
                }
            }
        }
    }

    /// Idle or Started -> Running
    ///
    /// Returns `Ok(false)` if the processor was halted before it got to run.
    pub(crate) fn enter_running(&self) -> Result<bool> {
        loop {
            let current = self.state();
            match current {
                ProcessorState::Idle | ProcessorState::Started => {
                    if self.transition(current, ProcessorState::Running) {
                        return Ok(true);
                    }
                }
                ProcessorState::Halting | ProcessorState::Halted => return Ok(false),
                ProcessorState::Running => return Err(DisruptorError::AlreadyRunning),
            }
        }
    }

    /// Running -> Halting, anything not yet running -> Halted
    pub(crate) fn halt(&self) {
        loop {
            let current = self.state();
            let next = match current {
                ProcessorState::Running => ProcessorState::Halting,
                ProcessorState::Idle | ProcessorState::Started => ProcessorState::Halted,
                ProcessorState::Halting | ProcessorState::Halted => return,
            };
            if self.transition(current, next) {
                return;
            }
        }
    }

    /// Running or Halting -> Halted, called once the loop has returned
    pub(crate) fn exit(&self) {
        if !self.transition(ProcessorState::Running, ProcessorState::Halted) {
            self.transition(ProcessorState::Halting, ProcessorState::Halted);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(
            self.state(),
            ProcessorState::Started | ProcessorState::Running
        )
    }

    pub(crate) fn is_processing(&self) -> bool {
        self.state() == ProcessorState::Running
    }
}

/// A consumer loop that can be submitted to an executor
pub trait EventProcessor: Send + Sync {
    /// The sequence this processor advances
    fn sequence(&self) -> Arc<Sequence>;

    /// Reserve the processor for a run
    ///
    /// # Errors
    /// Returns [`DisruptorError::AlreadyRunning`] if it is started or running.
    fn mark_started(&self) -> Result<()>;

    /// Run the processing loop on the calling thread until halted
    ///
    /// # Errors
    /// Returns the escalated error if the exception handler refused to absorb
    /// a handler failure, or [`DisruptorError::AlreadyRunning`] if another
    /// thread is already inside `run`.
    fn run(&self) -> Result<()>;

    /// Ask the loop to stop and wake it if it is waiting
    fn halt(&self);

    /// True from `mark_started` until a halt is requested or the loop exits
    fn is_running(&self) -> bool;

    fn state(&self) -> ProcessorState;
}

/// Delivers every available event to one [`EventHandler`] in batches
///
/// The handler is locked once for the whole run; the lock is never contended
/// since only the processor thread touches it while running.
pub struct BatchEventProcessor<T, H> {
    data_provider: Arc<dyn DataProvider<T>>,
    barrier: Arc<dyn SequenceBarrier>,
    handler: Mutex<H>,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    sequence: Arc<Sequence>,
    lifecycle: Lifecycle,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    /// Create a processor reading from `data_provider` through `barrier`
    ///
    /// The handler receives the processor's sequence through
    /// [`EventHandler::set_sequence_callback`].
    pub fn new(
        data_provider: Arc<dyn DataProvider<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        mut handler: H,
    ) -> Self {
        let sequence = Arc::new(Sequence::default());
        handler.set_sequence_callback(Arc::clone(&sequence));

        Self {
            data_provider,
            barrier,
            handler: Mutex::new(handler),
            exception_handler: Arc::new(FatalExceptionHandler::new()),
            sequence,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Replace the default [`FatalExceptionHandler`]
    pub fn with_exception_handler(mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) -> Self {
        self.exception_handler = exception_handler;
        self
    }

    fn process_events(&self, handler: &mut H) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            match self.barrier.wait_for(next_sequence) {
                Ok(available) if available >= next_sequence => {
                    handler.on_batch_start(available - next_sequence + 1);

                    while next_sequence <= available {
                        // SAFETY: the barrier reported the sequence as
                        // published and our own sequence still gates it.
                        let event = unsafe { self.data_provider.get(next_sequence) };
                        if let Err(error) =
                            handler.on_event(event, next_sequence, next_sequence == available)
                        {
                            if let Err(fatal) = self
                                .exception_handler
                                .handle_event_exception(error, next_sequence, event)
                            {
                                self.sequence.set(next_sequence - 1);
                                warn!(
                                    sequence = next_sequence,
                                    error = %fatal,
                                    "halting batch event processor after escalated error"
                                );
                                return Err(fatal);
                            }
                        }
                        next_sequence += 1;
                    }

                    self.sequence.set(available);
                }
                // A multi-producer claim below the cursor is not published yet.
                Ok(_) => {}
                Err(DisruptorError::Timeout) => {
                    if let Err(error) = handler.on_timeout(self.sequence.get()) {
                        warn!(sequence = self.sequence.get(), %error, "on_timeout failed");
                    }
                }
                Err(DisruptorError::Alert) => {
                    if !self.lifecycle.is_processing() {
                        break;
                    }
                    self.barrier.clear_alert();
                }
                Err(error) => return Err(error),
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

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync + 'static,
    H: EventHandler<T>,
{
    fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    fn mark_started(&self) -> Result<()> {
        self.lifecycle.mark_started()
    }

    fn run(&self) -> Result<()> {
        let mut handler = if self.lifecycle.enter_running()? {
            self.handler.lock()
        } else {
            let mut handler = self.handler.lock();
            self.notify_start(&mut handler);
            self.notify_shutdown(&mut handler);
            return Ok(());
        };

        self.barrier.clear_alert();
        self.notify_start(&mut handler);
        debug!(sequence = self.sequence.get(), "batch event processor running");

        let result = if self.lifecycle.is_processing() {
            self.process_events(&mut handler)
        } else {
            Ok(())
        };

        self.notify_shutdown(&mut handler);
        self.lifecycle.exit();
        debug!(sequence = self.sequence.get(), "batch event processor stopped");
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
