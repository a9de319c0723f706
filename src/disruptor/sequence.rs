//! Sequence implementation
//!
//! The Sequence tracks progress through the ring buffer for exactly one
//! producer or consumer. Every publication between threads goes through one of
//! these counters: writes are release stores, reads are acquire loads, so a
//! reader that observes value `s` also observes every slot write made before
//! `s` was stored.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::disruptor::INITIAL_CURSOR_VALUE;

/// A sequence number isolated on its own cache line
///
/// `CachePadded` aligns and pads the counter so that independently advancing
/// producer and consumer sequences allocated next to each other never share a
/// cache line.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value (acquire)
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value (release)
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the sequence value with a full fence
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if it currently holds `expected`
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Get the current value and then add
    #[inline]
    pub fn get_and_add(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel)
    }

    /// Minimum value across `sequences`, never greater than `minimum`
    ///
    /// Returns `minimum` when the slice is empty.
    pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
        sequences
            .iter()
            .map(|sequence| sequence.get())
            .fold(minimum, i64::min)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A fixed group of sequences read as one
///
/// The group reports the minimum of its members. Barriers use it for their
/// upstream dependencies and worker pools use it for their logical progress.
#[derive(Debug, Clone)]
pub struct SequenceGroup {
    sequences: Vec<Arc<Sequence>>,
}

impl SequenceGroup {
    /// Create a group over `sequences`; an empty group reads as `i64::MAX`
    pub fn new(sequences: Vec<Arc<Sequence>>) -> Self {
        Self { sequences }
    }

    /// Minimum value of the group
    #[inline]
    pub fn get(&self) -> i64 {
        match self.sequences.as_slice() {
            [single] => single.get(),
            sequences => Sequence::get_minimum_sequence(sequences, i64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }
}
