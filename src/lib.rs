//! Chainring - Ring Buffer Sequencing Core
//!
//! The coordination engine of a pre-allocated, single-writer ring buffer:
//! producers claim slots through a sequencer, consumers wait on barriers over
//! the sequences they depend on, and a dependency graph of consumers decides
//! which sequences hold producers back.
//!
//! ## Quick Start
//!
//! ```rust
//! use chainring::disruptor::{
//!     BlockingWaitStrategy, DefaultEventFactory, Disruptor, EventHandler, ProducerType,
//!     Result, ThreadExecutor,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Trade {
//!     price: i64,
//! }
//!
//! #[derive(Default)]
//! struct Journal {
//!     last_price: i64,
//! }
//!
//! impl EventHandler<Trade> for Journal {
//!     fn on_event(&mut self, event: &Trade, _sequence: i64, _end_of_batch: bool) -> Result<()> {
//!         self.last_price = event.price;
//!         Ok(())
//!     }
//! }
//!
//! let executor = Arc::new(ThreadExecutor::new("quickstart"));
//! let mut disruptor = Disruptor::new(
//!     DefaultEventFactory::<Trade>::new(),
//!     1024,
//!     ProducerType::Single,
//!     Arc::new(BlockingWaitStrategy::new()),
//!     executor.clone(),
//! )
//! .unwrap();
//!
//! disruptor.handle_events_with(Journal::default(), &[]).unwrap();
//! disruptor.start().unwrap();
//!
//! disruptor.publish_event(|trade, sequence| trade.price = sequence * 10).unwrap();
//!
//! disruptor.shutdown(None).unwrap();
//! executor.join_all().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`Sequence`**: padded atomic counter, the only shared progress state
//! - **`RingBuffer`**: pre-allocated slots addressed by `sequence & mask`
//! - **`Sequencer`**: claims and publishes slots (single or multi producer)
//! - **`SequenceBarrier`**: waits until dependents have passed a sequence
//! - **`WaitStrategy`**: how a consumer waits (spin, yield, sleep, block)
//! - **`EventProcessor`**: the consumer loops (batch and worker pool)
//! - **`ConsumerInfo`** / **`ConsumerRepository`**: the consumer graph
//! - **`Disruptor`**: owns the ring buffer and the graph

pub mod disruptor;

pub use disruptor::{
    is_power_of_two, BatchEventProcessor, BlockingWaitStrategy, BusySpinWaitStrategy,
    ConsumerId, DefaultEventFactory, Disruptor, DisruptorConfig, DisruptorError, EventFactory,
    EventHandler, EventProcessor, ExceptionHandler, Executor, MultiProducerSequencer,
    ProducerType, Result, RingBuffer, Sequence, SequenceBarrier, Sequencer,
    SingleProducerSequencer, SleepingWaitStrategy, ThreadExecutor, TokioExecutor, WaitStrategy,
    WorkHandler, YieldingWaitStrategy, INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
