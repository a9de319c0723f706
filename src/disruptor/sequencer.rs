//! Sequencer Implementation
//!
//! Sequencers hand out sequence numbers to producers and make sure a producer
//! never laps the slowest gating consumer. Two variants exist: the
//! single-producer sequencer owns its claim counter outright, the
//! multi-producer sequencer claims through a CAS loop on the cursor and tracks
//! per-slot availability so that consumers only see a contiguous prefix.

use crate::disruptor::{
    is_power_of_two, Cursored, DisruptorError, Result, Sequence, WaitStrategy,
};
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot::RwLock;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Coordinates claiming and publishing of ring buffer slots
///
/// Holds the producer cursor, the gating set and the wait strategy consumers
/// block on.
pub trait Sequencer: Cursored + Send + Sync + std::fmt::Debug {
    /// The capacity of the ring buffer this sequencer guards
    fn buffer_size(&self) -> usize;

    /// The producer cursor
    ///
    /// For a single producer this is the last published sequence; for
    /// multiple producers it is the last claimed one.
    fn cursor(&self) -> Arc<Sequence>;

    /// The wait strategy consumers use to wait on this cursor
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Whether `required` more slots can be claimed without wrapping
    fn has_available_capacity(&self, required: usize) -> bool;

    /// Number of slots that can still be claimed before blocking
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, blocking while the buffer is full
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim the next `n` sequences, blocking while the buffer is full
    ///
    /// # Arguments
    /// * `n` - The number of sequences to claim, `1..=buffer_size`
    ///
    /// # Returns
    /// The highest claimed sequence; the claim is `[returned - n + 1, returned]`
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidClaim`] when `n` is out of range.
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence without blocking
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences without blocking
    ///
    /// # Errors
    /// Returns [`DisruptorError::InsufficientCapacity`] when the claim would
    /// wrap past a gating sequence. Nothing is claimed in that case.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Move the cursor to `sequence` without publishing
    ///
    /// Only meant for initialisation and tests.
    fn claim(&self, sequence: i64);

    /// Make `sequence` visible to consumers
    fn publish(&self, sequence: i64);

    /// Make every sequence in `[low, high]` visible to consumers
    fn publish_range(&self, low: i64, high: i64);

    /// Whether `sequence` has been published and not yet overwritten
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `[lower_bound, available_sequence]` that can be
    /// consumed without skipping an unpublished slot
    ///
    /// Returns `lower_bound - 1` if `lower_bound` itself is not published.
    fn get_highest_published_sequence(&self, lower_bound: i64, available_sequence: i64) -> i64;

    /// Add sequences the producer must not overtake
    ///
    /// The added sequences are first moved to the current cursor so a consumer
    /// joining a running buffer does not gate on slots it will never read.
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence
    ///
    /// # Returns
    /// True if the sequence was part of the gating set
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum of the gating set and the cursor
    fn get_minimum_sequence(&self) -> i64;

    /// Snapshot of the current gating set
    fn gating_sequences(&self) -> Vec<Arc<Sequence>>;
}

/// Copy-on-write gating set
///
/// Producers only read it on the slow path, so writers replace the whole
/// slice and readers clone the `Arc`.
#[derive(Debug)]
struct GatingSequences {
    sequences: RwLock<Arc<[Arc<Sequence>]>>,
}

impl GatingSequences {
    fn new() -> Self {
        Self {
            sequences: RwLock::new(Arc::from(Vec::new())),
        }
    }

    fn snapshot(&self) -> Arc<[Arc<Sequence>]> {
        Arc::clone(&self.sequences.read())
    }

    fn add(&self, added: &[Arc<Sequence>], cursor: &Sequence) {
        let mut sequences = self.sequences.write();
        let cursor_value = cursor.get();
        for sequence in added {
            sequence.set(cursor_value);
        }

        let mut updated = Vec::with_capacity(sequences.len() + added.len());
        updated.extend(sequences.iter().cloned());
        updated.extend(added.iter().cloned());
        *sequences = Arc::from(updated);

        debug!(
            added = added.len(),
            total = sequences.len(),
            cursor = cursor_value,
            "gating sequences added"
        );
    }

    fn remove(&self, removed: &Arc<Sequence>) -> bool {
        let mut sequences = self.sequences.write();
        let before = sequences.len();
        let updated: Vec<_> = sequences
            .iter()
            .filter(|sequence| !Arc::ptr_eq(sequence, removed))
            .cloned()
            .collect();

        if updated.len() == before {
            return false;
        }

        *sequences = Arc::from(updated);
        debug!(total = sequences.len(), "gating sequence removed");
        true
    }

    fn minimum(&self, minimum: i64) -> i64 {
        Sequence::get_minimum_sequence(&self.snapshot(), minimum)
    }
}

fn validate_buffer_size(buffer_size: usize) -> Result<()> {
    if !is_power_of_two(buffer_size) {
        return Err(DisruptorError::InvalidBufferSize(buffer_size));
    }
    Ok(())
}

fn validate_claim(n: i64, buffer_size: usize) -> Result<()> {
    if n < 1 || n > buffer_size as i64 {
        return Err(DisruptorError::InvalidClaim {
            requested: n,
            buffer_size,
        });
    }
    Ok(())
}

/// Single producer sequencer
///
/// Only one thread may claim and publish. The claim counter and the cached
/// gating minimum are owned by that thread, so the fast path touches no
/// shared state at all.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    gating_sequences: GatingSequences,
    next_value: CachePadded<AtomicI64>,
    cached_value: CachePadded<AtomicI64>,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidBufferSize`] unless `buffer_size` is a
    /// power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        validate_buffer_size(buffer_size)?;
        Ok(Self {
            buffer_size,
            cursor: Arc::new(Sequence::default()),
            wait_strategy,
            gating_sequences: GatingSequences::new(),
            next_value: CachePadded::new(AtomicI64::new(Sequence::default().get())),
            cached_value: CachePadded::new(AtomicI64::new(Sequence::default().get())),
        })
    }

    fn has_capacity(&self, required: i64, do_store: bool) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = next_value + required - self.buffer_size as i64;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            if do_store {
                fence(Ordering::SeqCst);
            }

            let min_sequence = self.gating_sequences.minimum(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Cursored for SingleProducerSequencer {
    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }
}

impl Sequencer for SingleProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required as i64, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.gating_sequences.minimum(next_value);
        self.buffer_size as i64 - (next_value - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            fence(Ordering::SeqCst);

            let backoff = Backoff::new();
            let mut min_sequence = self.gating_sequences.minimum(next_value);
            while wrap_point > min_sequence {
                backoff.snooze();
                min_sequence = self.gating_sequences.minimum(next_value);
            }

            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        if !self.has_capacity(n, true) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn claim(&self, sequence: i64) {
        self.next_value.store(sequence, Ordering::Relaxed);
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.cursor.get();
        sequence <= current && sequence > current - self.buffer_size as i64
    }

    fn get_highest_published_sequence(&self, _lower_bound: i64, available_sequence: i64) -> i64 {
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences.add(gating_sequences, &self.cursor);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating_sequences.remove(sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.gating_sequences.minimum(self.cursor.get())
    }

    fn gating_sequences(&self) -> Vec<Arc<Sequence>> {
        self.gating_sequences.snapshot().to_vec()
    }
}

/// Multi producer sequencer
///
/// Any number of threads may claim concurrently. Claims race on the cursor,
/// and because claimers may publish out of order each slot carries the wrap
/// generation it was last published for.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    buffer_size: usize,
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    gating_sequences: GatingSequences,
    gating_sequence_cache: CachePadded<AtomicI64>,
    available_buffer: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidBufferSize`] unless `buffer_size` is a
    /// power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        validate_buffer_size(buffer_size)?;

        let available_buffer = (0..buffer_size)
            .map(|_| AtomicI32::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            buffer_size,
            cursor: Arc::new(Sequence::default()),
            wait_strategy,
            gating_sequences: GatingSequences::new(),
            gating_sequence_cache: CachePadded::new(AtomicI64::new(Sequence::default().get())),
            available_buffer,
            index_mask: buffer_size as i64 - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    fn has_capacity(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = cursor_value + required - self.buffer_size as i64;
        let cached_gating_sequence = self.gating_sequence_cache.load(Ordering::Acquire);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > cursor_value {
            let min_sequence = self.gating_sequences.minimum(cursor_value);
            self.gating_sequence_cache
                .store(min_sequence, Ordering::Release);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Cursored for MultiProducerSequencer {
    fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }
}

impl Sequencer for MultiProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required as i64, self.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.gating_sequences.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        let backoff = Backoff::new();
        loop {
            let current = self.cursor.get();
            let next = current + n;
            let wrap_point = next - self.buffer_size as i64;
            let cached_gating_sequence = self.gating_sequence_cache.load(Ordering::Acquire);

            if wrap_point > cached_gating_sequence || cached_gating_sequence > current {
                let gating_sequence = self.gating_sequences.minimum(current);
                if wrap_point > gating_sequence {
                    backoff.snooze();
                    continue;
                }

                self.gating_sequence_cache
                    .store(gating_sequence, Ordering::Release);
            } else if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            } else {
                backoff.spin();
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        validate_claim(n, self.buffer_size)?;

        loop {
            let current = self.cursor.get();
            let next = current + n;

            if !self.has_capacity(n, current) {
                return Err(DisruptorError::InsufficientCapacity);
            }

            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn claim(&self, sequence: i64) {
        self.cursor.set(sequence);
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        if sequence < 0 {
            return false;
        }
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn get_highest_published_sequence(&self, lower_bound: i64, available_sequence: i64) -> i64 {
        for sequence in lower_bound..=available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating_sequences.add(gating_sequences, &self.cursor);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating_sequences.remove(sequence)
    }

    fn get_minimum_sequence(&self) -> i64 {
        self.gating_sequences.minimum(self.cursor.get())
    }

    fn gating_sequences(&self) -> Vec<Arc<Sequence>> {
        self.gating_sequences.snapshot().to_vec()
    }
}
