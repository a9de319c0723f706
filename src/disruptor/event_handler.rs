//! Event handler traits
//!
//! User code plugs into the processor loops through these traits. Handlers
//! only ever see `&T`: a slot is written by the producer that claimed it and
//! is read-only for every consumer.

use crate::disruptor::{Result, Sequence};
use std::marker::PhantomData;
use std::sync::Arc;

/// Callback interface for a batch event processor
///
/// A handler is owned by exactly one processor, so every callback runs on
/// that processor's thread and `&mut self` needs no synchronisation.
///
/// # Examples
/// ```
/// use chainring::disruptor::{EventHandler, Result};
///
/// #[derive(Default)]
/// struct Summer {
///     total: i64,
/// }
///
/// impl EventHandler<i64> for Summer {
///     fn on_event(&mut self, event: &i64, _sequence: i64, _end_of_batch: bool) -> Result<()> {
///         self.total += *event;
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler<T>: Send {
    /// Process one event
    ///
    /// # Arguments
    /// * `event` - The published event
    /// * `sequence` - Its sequence
    /// * `end_of_batch` - True for the last event the barrier made available
    ///   in this batch; a natural point to flush
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()>;

    /// Called once per batch before the first `on_event`
    fn on_batch_start(&mut self, _batch_size: i64) {}

    /// Called on the processor thread before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on the processor thread after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy gave up waiting
    ///
    /// `sequence` is the last sequence the processor handled.
    fn on_timeout(&mut self, _sequence: i64) -> Result<()> {
        Ok(())
    }

    /// Receive the processor's own sequence
    ///
    /// Handlers that complete work asynchronously can advance it themselves
    /// to release slots before the batch ends.
    fn set_sequence_callback(&mut self, _sequence_callback: Arc<Sequence>) {}
}

/// Callback interface for a worker in a worker pool
///
/// Each event is delivered to exactly one worker of the pool, so there is no
/// batch or sequence information.
pub trait WorkHandler<T>: Send {
    fn on_event(&mut self, event: &T) -> Result<()>;

    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Event handler backed by a closure
pub struct ClosureEventHandler<T, F> {
    handler: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }
}

/// Work handler backed by a closure
pub struct ClosureWorkHandler<T, F> {
    handler: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ClosureWorkHandler<T, F>
where
    F: FnMut(&T) -> Result<()> + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T, F> WorkHandler<T> for ClosureWorkHandler<T, F>
where
    F: FnMut(&T) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &T) -> Result<()> {
        (self.handler)(event)
    }
}

/// Handler that ignores every event
///
/// Useful as a placeholder stage and in benchmarks.
pub struct NoOpEventHandler<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> NoOpEventHandler<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for NoOpEventHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHandler<T> for NoOpEventHandler<T> {
    fn on_event(&mut self, _event: &T, _sequence: i64, _end_of_batch: bool) -> Result<()> {
        Ok(())
    }
}
