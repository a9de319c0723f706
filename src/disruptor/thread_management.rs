//! Named, optionally core-pinned consumer threads
//!
//! Used by [`ThreadExecutor`](crate::disruptor::ThreadExecutor) to give every
//! processor its own OS thread.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Builder for a consumer thread
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pin the thread to `core_id` once it starts
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidConfiguration`] if the core does not
    /// exist on this machine.
    pub fn pin_at_core(mut self, core_id: usize) -> Result<Self> {
        let cores = available_cores();
        if !cores.contains(&core_id) {
            return Err(DisruptorError::InvalidConfiguration(format!(
                "CPU core {core_id} is not available, available cores: {cores:?}"
            )));
        }
        self.affinity = Some(CoreId { id: core_id });
        Ok(self)
    }

    /// Spawn the thread
    ///
    /// # Errors
    /// Returns [`DisruptorError::Spawn`] if the OS refuses to create it.
    pub fn spawn<F>(self, f: F) -> Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| "chainring-consumer".to_string());
        let affinity = self.affinity;
        let name_in_thread = thread_name.clone();

        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if let Some(core_id) = affinity {
                    if core_affinity::set_for_current(core_id) {
                        debug!(thread = %name_in_thread, core = core_id.id, "pinned thread");
                    } else {
                        warn!(thread = %name_in_thread, core = core_id.id, "could not pin thread");
                    }
                }
                f();
            })
            .map_err(DisruptorError::Spawn)?;

        Ok(ManagedThread {
            join_handle,
            thread_name,
        })
    }
}

/// Handle to a spawned consumer thread
///
/// Dropping it detaches the thread.
#[derive(Debug)]
pub struct ManagedThread {
    join_handle: JoinHandle<()>,
    thread_name: String,
}

impl ManagedThread {
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Wait for the thread to finish
    ///
    /// # Errors
    /// Returns [`DisruptorError::ThreadPanicked`] if the thread panicked.
    pub fn join(self) -> Result<()> {
        self.join_handle
            .join()
            .map_err(|_| DisruptorError::ThreadPanicked(self.thread_name))
    }
}

/// Ids of the CPU cores this process may run on
pub fn available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .into_iter()
        .map(|core| core.id)
        .collect()
}
