//! Core interfaces shared by the ring buffer, sequencers and processors

/// Provides access to a cursor value
pub trait Cursored {
    /// Get the current cursor value
    fn get_cursor(&self) -> i64;
}

/// Read access to the event stored for a sequence
///
/// Processors read through this trait instead of a concrete ring buffer so
/// the loop logic stays independent of the storage.
pub trait DataProvider<T>: Send + Sync {
    /// Get the event stored for `sequence`
    ///
    /// # Safety
    /// `sequence` must have been returned by a sequence barrier (or claimed by
    /// the caller) and must not have been overwritten by a later wrap. No
    /// visibility check is performed here.
    unsafe fn get(&self, sequence: i64) -> &T;
}
