//! Ring Buffer Implementation
//!
//! The ring buffer owns the preallocated slots and the sequencer that hands
//! them out. Slot `s & (size - 1)` holds event `s` until the producer wraps
//! around; the sequencer's gating set guarantees that only happens once every
//! end-of-chain consumer has moved past it.

use crate::disruptor::{
    is_power_of_two, DataProvider, DisruptorError, EventFactory, MultiProducerSequencer,
    ProcessingSequenceBarrier, ProducerType, Result, Sequence, SequenceBarrier, Sequencer,
    SingleProducerSequencer, WaitStrategy,
};
use std::cell::UnsafeCell;
use std::sync::Arc;

/// Publishes a claimed range when dropped
///
/// Keeps the sequencer consistent if a translator panics halfway through: a
/// claimed but never published slot would stall every consumer forever.
struct PublishGuard<'a> {
    sequencer: &'a dyn Sequencer,
    low: i64,
    high: i64,
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.sequencer.publish_range(self.low, self.high);
    }
}

/// Preallocated circular buffer of events
///
/// # Type Parameters
/// * `T` - The event type stored in each slot
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer and fill every slot from `event_factory`
    ///
    /// # Arguments
    /// * `event_factory` - Called once per slot
    /// * `buffer_size` - Number of slots, must be a power of two
    /// * `producer_type` - Selects the sequencer implementation
    /// * `wait_strategy` - Strategy consumers use to wait on this buffer
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidBufferSize`] if `buffer_size` is not a
    /// power of two.
    pub fn new<F>(
        event_factory: F,
        buffer_size: usize,
        producer_type: ProducerType,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        if !is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        let sequencer: Arc<dyn Sequencer> = match producer_type {
            ProducerType::Single => {
                Arc::new(SingleProducerSequencer::new(buffer_size, wait_strategy)?)
            }
            ProducerType::Multi => {
                Arc::new(MultiProducerSequencer::new(buffer_size, wait_strategy)?)
            }
        };

        let slots = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer,
        })
    }

    /// Create a ring buffer for exactly one publishing thread
    pub fn create_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::new(event_factory, buffer_size, ProducerType::Single, wait_strategy)
    }

    /// Create a ring buffer for any number of publishing threads
    pub fn create_multi_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        Self::new(event_factory, buffer_size, ProducerType::Multi, wait_strategy)
    }

    #[inline]
    fn slot(&self, sequence: i64) -> *mut T {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: masking keeps the index below slots.len().
        unsafe { self.slots.get_unchecked(index) }.get()
    }

    /// Get the event stored for `sequence`
    ///
    /// # Safety
    /// The caller must have observed `sequence` as available through a
    /// sequence barrier (or own its claim) and must not hold the reference
    /// past the point where its own sequence moves beyond it.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &T {
        &*self.slot(sequence)
    }

    /// Raw pointer to the slot for `sequence`
    ///
    /// # Safety
    /// Only the thread that claimed `sequence` may write through the pointer,
    /// and only until it publishes the sequence.
    #[inline]
    pub unsafe fn get_mut_unchecked(&self, sequence: i64) -> *mut T {
        self.slot(sequence)
    }

    /// Claim the next slot, let `translator` fill it and publish it
    ///
    /// Blocks while the buffer is full. The slot is published even if the
    /// translator panics.
    ///
    /// # Returns
    /// The published sequence
    pub fn publish_event<F>(&self, translator: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, translator);
        Ok(sequence)
    }

    /// Like [`RingBuffer::publish_event`] but fails instead of blocking
    ///
    /// # Errors
    /// Returns [`DisruptorError::InsufficientCapacity`] when the buffer is full;
    /// the translator is not called in that case.
    pub fn try_publish_event<F>(&self, translator: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(sequence, translator);
        Ok(sequence)
    }

    /// Claim one slot per item, translate every item and publish them together
    ///
    /// # Returns
    /// The highest published sequence
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidClaim`] for an empty batch or one
    /// larger than the buffer.
    pub fn publish_events<I, F>(&self, items: I, mut translator: F) -> Result<i64>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(&mut T, i64, I::Item),
    {
        let items = items.into_iter();
        let high = self.sequencer.next_n(items.len() as i64)?;
        let low = high - items.len() as i64 + 1;

        let _guard = PublishGuard {
            sequencer: self.sequencer.as_ref(),
            low,
            high,
        };

        for (sequence, item) in (low..=high).zip(items) {
            // SAFETY: [low, high] was claimed above and is unpublished until
            // the guard drops.
            let event = unsafe { &mut *self.slot(sequence) };
            translator(event, sequence, item);
        }

        Ok(high)
    }

    fn translate_and_publish<F>(&self, sequence: i64, translator: F)
    where
        F: FnOnce(&mut T, i64),
    {
        let _guard = PublishGuard {
            sequencer: self.sequencer.as_ref(),
            low: sequence,
            high: sequence,
        };

        // SAFETY: the sequence was claimed by the caller and stays invisible
        // to consumers until the guard publishes it.
        let event = unsafe { &mut *self.slot(sequence) };
        translator(event, sequence);
    }

    /// Claim the next sequence, blocking while the buffer is full
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    /// Claim the next `n` sequences, blocking while the buffer is full
    pub fn next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence without blocking
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` sequences without blocking
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Create a barrier that waits on the cursor and on `dependents`
    pub fn new_barrier(&self, dependents: &[Arc<Sequence>]) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.sequencer),
            dependents.to_vec(),
        ))
    }

    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Minimum of the gating set and the cursor
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.get_minimum_sequence()
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    pub fn has_available_capacity(&self, required: usize) -> bool {
        self.sequencer.has_available_capacity(required)
    }

    /// Current producer cursor value
    pub fn cursor(&self) -> i64 {
        self.sequencer.get_cursor()
    }

    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    pub fn sequencer(&self) -> Arc<dyn Sequencer> {
        Arc::clone(&self.sequencer)
    }
}

// SAFETY: slots are only written by the thread owning the claim and read
// after an acquire load of a sequence published with release ordering.
unsafe impl<T: Send + Sync> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}

impl<T: Send + Sync> DataProvider<T> for RingBuffer<T> {
    unsafe fn get(&self, sequence: i64) -> &T {
        &*self.slot(sequence)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
