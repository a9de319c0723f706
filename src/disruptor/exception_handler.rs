//! Exception Handler Implementation
//!
//! When a handler fails, the processor hands the error to its exception
//! handler. Returning `Ok` absorbs the fault and processing continues with the
//! next event; returning `Err` escalates it and halts the processor that hit
//! it (and only that one).

use crate::disruptor::{DisruptorError, Result};
use std::marker::PhantomData;
use tracing::{error, warn};

/// Decides what happens to errors raised by event and work handlers
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// Handle an error raised while processing `event`
    ///
    /// # Arguments
    /// * `error` - The handler's error
    /// * `sequence` - The sequence of the failing event
    /// * `event` - The failing event
    ///
    /// # Returns
    /// `Ok(())` to skip the event and continue, `Err` to halt the processor
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: &T) -> Result<()>;

    /// Handle an error raised by a handler's `on_start`
    fn handle_on_start_exception(&self, error: DisruptorError);

    /// Handle an error raised by a handler's `on_shutdown`
    fn handle_on_shutdown_exception(&self, error: DisruptorError);
}

/// Logs and escalates every event error
///
/// This is the default: a failing handler stops its processor instead of
/// silently skipping data.
pub struct FatalExceptionHandler<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> FatalExceptionHandler<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for FatalExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for FatalExceptionHandler<T> {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: &T) -> Result<()> {
        error!(sequence, %error, "exception processing event");
        Err(error)
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        error!(%error, "exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        error!(%error, "exception during on_shutdown");
    }
}

/// Logs every error and keeps processing
pub struct LoggingExceptionHandler<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> LoggingExceptionHandler<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for LoggingExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for LoggingExceptionHandler<T> {
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, _event: &T) -> Result<()> {
        warn!(sequence, %error, "skipping event after handler error");
        Ok(())
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        warn!(%error, "exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        warn!(%error, "exception during on_shutdown");
    }
}

/// Silently absorbs every error
pub struct IgnoreExceptionHandler<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> IgnoreExceptionHandler<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for IgnoreExceptionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler<T> {
    fn handle_event_exception(&self, _error: DisruptorError, _sequence: i64, _event: &T) -> Result<()> {
        Ok(())
    }

    fn handle_on_start_exception(&self, _error: DisruptorError) {}

    fn handle_on_shutdown_exception(&self, _error: DisruptorError) {}
}

/// Exception handler backed by a closure for event errors
///
/// Lifecycle errors are logged.
pub struct ClosureExceptionHandler<T, F> {
    handler: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ClosureExceptionHandler<T, F>
where
    F: Fn(DisruptorError, i64, &T) -> Result<()> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T, F> ExceptionHandler<T> for ClosureExceptionHandler<T, F>
where
    F: Fn(DisruptorError, i64, &T) -> Result<()> + Send + Sync,
{
    fn handle_event_exception(&self, error: DisruptorError, sequence: i64, event: &T) -> Result<()> {
        (self.handler)(error, sequence, event)
    }

    fn handle_on_start_exception(&self, error: DisruptorError) {
        error!(%error, "exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: DisruptorError) {
        error!(%error, "exception during on_shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_fatal_handler_escalates() {
        let handler = FatalExceptionHandler::<u32>::new();
        let result = handler.handle_event_exception(DisruptorError::handler("boom"), 7, &1);
        assert!(matches!(result, Err(DisruptorError::Handler(_))));
        handler.handle_on_start_exception(DisruptorError::handler("start"));
    }

    #[test]
    fn test_logging_and_ignore_handlers_absorb() {
        let logging = LoggingExceptionHandler::<u32>::new();
        let ignore = IgnoreExceptionHandler::<u32>::new();

        assert!(logging
            .handle_event_exception(DisruptorError::handler("boom"), 1, &1)
            .is_ok());
        assert!(ignore
            .handle_event_exception(DisruptorError::handler("boom"), 1, &1)
            .is_ok());
        logging.handle_on_shutdown_exception(DisruptorError::Timeout);
    }

    #[test]
    fn test_closure_handler_sees_sequence_and_event() {
        let last_sequence = AtomicI64::new(-1);
        let handler = ClosureExceptionHandler::new(|error, sequence, event: &u32| {
            last_sequence.store(sequence, Ordering::Relaxed);
            if *event == 0 {
                Err(error)
            } else {
                Ok(())
            }
        });

        assert!(handler
            .handle_event_exception(DisruptorError::handler("recoverable"), 3, &1)
            .is_ok());
        assert!(handler
            .handle_event_exception(DisruptorError::handler("fatal"), 4, &0)
            .is_err());
        assert_eq!(last_sequence.load(Ordering::Relaxed), 4);
    }
}
