//! Event factories
//!
//! A ring buffer calls its factory exactly once per slot while it is being
//! built; afterwards producers overwrite slots in place and nothing on the
//! publish path allocates.

use std::marker::PhantomData;

/// Creates the preallocated value for one ring buffer slot
///
/// # Examples
/// ```
/// use chainring::disruptor::EventFactory;
///
/// struct Quote {
///     price: f64,
/// }
///
/// struct QuoteFactory;
///
/// impl EventFactory<Quote> for QuoteFactory {
///     fn new_instance(&self) -> Quote {
///         Quote { price: 0.0 }
///     }
/// }
///
/// assert_eq!(QuoteFactory.new_instance().price, 0.0);
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Build one slot value in its initial state
    fn new_instance(&self) -> T;
}

/// Fills slots with `T::default()`
pub struct DefaultEventFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Fills slots by calling a closure
pub struct ClosureEventFactory<T, F> {
    factory_fn: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _marker: PhantomData,
        }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<T, F>
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}

/// Fills slots with clones of a prototype
pub struct CloneEventFactory<T> {
    prototype: T,
}

impl<T: Clone> CloneEventFactory<T> {
    pub fn new(prototype: T) -> Self {
        Self { prototype }
    }
}

impl<T: Clone + Send + Sync> EventFactory<T> for CloneEventFactory<T> {
    fn new_instance(&self) -> T {
        self.prototype.clone()
    }
}
