//! Sequence Barrier Implementation
//!
//! A sequence barrier is the consumer-side gate: it waits until both the
//! producer cursor and every upstream consumer have passed a sequence, and for
//! multi-producer buffers clamps the answer to the contiguously published
//! prefix.

use crate::disruptor::{
    DisruptorError, Result, Sequence, SequenceGroup, Sequencer, WaitStrategy,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination barrier for managing dependencies between event processors
pub trait SequenceBarrier: Send + Sync {
    /// Wait for the given sequence to become available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    ///
    /// # Returns
    /// The highest sequence that may be consumed. It may be higher than
    /// requested, or lower when a multi-producer claim below it is still
    /// unpublished.
    ///
    /// # Errors
    /// Returns [`DisruptorError::Alert`] if the barrier is alerted, or
    /// [`DisruptorError::Timeout`] from timeout-capable wait strategies.
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// Current producer cursor, regardless of upstream consumers
    fn get_cursor(&self) -> i64;

    /// Whether the barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert the barrier and wake every waiter
    fn alert(&self);

    /// Clear the alert so the barrier can be waited on again
    fn clear_alert(&self);

    /// Fail with [`DisruptorError::Alert`] if the barrier is alerted
    fn check_alert(&self) -> Result<()>;
}

/// Barrier over a sequencer cursor and a set of upstream consumer sequences
///
/// With no upstream sequences the barrier waits on the producer cursor alone.
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    dependents: SequenceGroup,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a barrier gated on `dependent_sequences`
    ///
    /// # Arguments
    /// * `sequencer` - The sequencer whose cursor is tracked
    /// * `dependent_sequences` - Upstream consumer sequences; empty means the
    ///   barrier only follows the producer cursor
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: Vec<Arc<Sequence>>) -> Self {
        let cursor = sequencer.cursor();
        let dependents = if dependent_sequences.is_empty() {
            SequenceGroup::new(vec![Arc::clone(&cursor)])
        } else {
            SequenceGroup::new(dependent_sequences)
        };

        Self {
            wait_strategy: sequencer.wait_strategy(),
            sequencer,
            cursor,
            dependents,
            alerted: AtomicBool::new(false),
        }
    }

    /// The sequences this barrier waits on besides the cursor
    pub fn dependents(&self) -> &SequenceGroup {
        &self.dependents
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available = self
            .wait_strategy
            .wait_for(sequence, &self.cursor, &self.dependents, self)?;

        if available < sequence {
            return Ok(available);
        }

        Ok(self
            .sequencer
            .get_highest_published_sequence(sequence, available))
    }

    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            return Err(DisruptorError::Alert);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessingSequenceBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSequenceBarrier")
            .field("cursor", &self.cursor.get())
            .field("dependents", &self.dependents.get())
            .field("alerted", &self.is_alerted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BlockingWaitStrategy, BusySpinWaitStrategy, MultiProducerSequencer,
        SingleProducerSequencer,
    };
    use std::thread;
    use std::time::Duration;

    fn single_sequencer() -> Arc<dyn Sequencer> {
        Arc::new(SingleProducerSequencer::new(16, Arc::new(BusySpinWaitStrategy::new())).unwrap())
    }

    #[test]
    fn test_waits_on_cursor_without_dependents() {
        let sequencer = single_sequencer();
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), Vec::new());

        let high = sequencer.next_n(4).unwrap();
        sequencer.publish(high);

        assert_eq!(barrier.wait_for(0).unwrap(), 3);
        assert_eq!(barrier.get_cursor(), 3);
    }

    #[test]
    fn test_bounded_by_upstream_consumers() {
        let sequencer = single_sequencer();
        let upstream_a = Arc::new(Sequence::new(5));
        let upstream_b = Arc::new(Sequence::new(3));
        let barrier = ProcessingSequenceBarrier::new(
            Arc::clone(&sequencer),
            vec![upstream_a, upstream_b.clone()],
        );

        let high = sequencer.next_n(8).unwrap();
        sequencer.publish(high);

        assert_eq!(barrier.wait_for(2).unwrap(), 3);
        assert_eq!(barrier.get_cursor(), 7);
        assert_eq!(barrier.dependents().get(), 3);

        upstream_b.set(7);
        assert_eq!(barrier.wait_for(4).unwrap(), 5);
        assert_eq!(barrier.get_cursor(), 7);
    }

    #[test]
    fn test_clamps_to_contiguous_multi_producer_prefix() {
        let sequencer: Arc<dyn Sequencer> = Arc::new(
            MultiProducerSequencer::new(16, Arc::new(BusySpinWaitStrategy::new())).unwrap(),
        );
        let barrier = ProcessingSequenceBarrier::new(Arc::clone(&sequencer), Vec::new());

        let high = sequencer.next_n(5).unwrap();
        sequencer.publish_range(0, high);
        let a = sequencer.next().unwrap();
        let b = sequencer.next().unwrap();
        sequencer.publish(b);

        assert_eq!(barrier.wait_for(0).unwrap(), 4);
        assert_eq!(barrier.wait_for(5).unwrap(), 4);

        sequencer.publish(a);
        assert_eq!(barrier.wait_for(5).unwrap(), 6);
    }

    #[test]
    fn test_alerted_barrier_fails_immediately() {
        let barrier = ProcessingSequenceBarrier::new(single_sequencer(), Vec::new());

        barrier.alert();
        assert!(barrier.is_alerted());
        assert!(matches!(barrier.wait_for(0), Err(DisruptorError::Alert)));
        assert!(matches!(barrier.check_alert(), Err(DisruptorError::Alert)));

        barrier.clear_alert();
        assert!(barrier.check_alert().is_ok());
    }

    #[test]
    fn test_alert_wakes_blocked_waiter() {
        let sequencer: Arc<dyn Sequencer> = Arc::new(
            SingleProducerSequencer::new(16, Arc::new(BlockingWaitStrategy::new())).unwrap(),
        );
        let barrier = Arc::new(ProcessingSequenceBarrier::new(sequencer, Vec::new()));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_for(0))
        };

        thread::sleep(Duration::from_millis(20));
        barrier.alert();

        assert!(matches!(waiter.join().unwrap(), Err(DisruptorError::Alert)));
    }
}
