//! Chainring sequencing core
//!
//! The coordination engine of a single-writer ring buffer: monotonic sequences,
//! the slot allocator, producer-side sequencers, consumer-side barriers, the
//! processor loops and the consumer dependency graph that ties them together.

pub mod config;
pub mod consumer_info;
pub mod consumer_repository;
pub mod core_interfaces;
#[allow(clippy::module_inception)]
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod exception_handler;
pub mod executor;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod wait_strategy;
pub mod work_processor;

#[cfg(test)]
mod property_tests;

pub use config::{DisruptorConfig, WaitStrategyConfig};
pub use consumer_info::{ConsumerInfo, EventProcessorInfo, WorkerPoolInfo};
pub use consumer_repository::{ConsumerId, ConsumerRepository};
pub use core_interfaces::{Cursored, DataProvider};
pub use disruptor::Disruptor;
pub use event_factory::{CloneEventFactory, ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use event_handler::{
    ClosureEventHandler, ClosureWorkHandler, EventHandler, NoOpEventHandler, WorkHandler,
};
pub use event_processor::{BatchEventProcessor, EventProcessor, ProcessorState};
pub use exception_handler::{
    ClosureExceptionHandler, ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler,
    LoggingExceptionHandler,
};
pub use executor::{Executor, Task, ThreadExecutor, TokioExecutor};
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::{Sequence, SequenceGroup};
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use thread_management::{ManagedThread, ThreadBuilder};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, LiteBlockingWaitStrategy, SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
pub use work_processor::{WorkProcessor, WorkerPool};

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the sequencing core
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cannot claim {requested} slots from a buffer of size {buffer_size}")]
    InvalidClaim { requested: i64, buffer_size: usize },

    #[error("Insufficient capacity in ring buffer")]
    InsufficientCapacity,

    #[error("Sequence barrier alerted")]
    Alert,

    #[error("Timeout waiting for sequence")]
    Timeout,

    #[error("Event processor is already running")]
    AlreadyRunning,

    #[error("Consumers have already been started")]
    AlreadyStarted,

    #[error("Unknown consumer id: {0}")]
    UnknownConsumer(usize),

    #[error("Consumer {consumer} is halted but dependents {dependents:?} are still running")]
    HaltedDependency {
        consumer: usize,
        dependents: Vec<usize>,
    },

    #[error("Consumer {consumer} halted at sequence {progress} behind cursor {cursor}")]
    HaltedConsumer {
        consumer: usize,
        progress: i64,
        cursor: i64,
    },

    #[error("Event handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    #[error("Failed to spawn consumer task: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Consumer thread '{0}' panicked")]
    ThreadPanicked(String),

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[source] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl DisruptorError {
    /// Build a handler fault from any displayable message
    pub fn handler<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Handler(anyhow::Error::msg(message))
    }
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}
