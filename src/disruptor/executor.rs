//! Executors
//!
//! Consumers never spawn threads themselves; they submit their processor loop
//! to an injected [`Executor`]. Two are provided: one OS thread per task, or a
//! blocking task on a Tokio runtime.

use crate::disruptor::thread_management::available_cores;
use crate::disruptor::{DisruptorError, ManagedThread, Result, ThreadBuilder};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// A unit of work submitted to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs consumer tasks
///
/// Every task is a processor loop that blocks until halted, so an executor
/// must give each task its own thread (or an equivalent blocking slot).
pub trait Executor: Send + Sync {
    /// Start running `task`
    ///
    /// # Errors
    /// Returns [`DisruptorError::Spawn`] if the task could not be started.
    fn execute(&self, task: Task) -> Result<()>;
}

/// Runs each task on a dedicated named OS thread
///
/// Threads are named `{prefix}-{index}`. With core pinning enabled they are
/// assigned to the available cores round-robin.
#[derive(Debug)]
pub struct ThreadExecutor {
    thread_name_prefix: String,
    cores: Vec<usize>,
    spawned: AtomicUsize,
    threads: Mutex<Vec<ManagedThread>>,
}

impl ThreadExecutor {
    pub fn new<S: Into<String>>(thread_name_prefix: S) -> Self {
        Self {
            thread_name_prefix: thread_name_prefix.into(),
            cores: Vec::new(),
            spawned: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Pin spawned threads to the machine's cores round-robin
    pub fn with_core_pinning(mut self) -> Self {
        self.cores = available_cores();
        self
    }

    /// Number of threads spawned so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Wait for every spawned thread to finish
    ///
    /// Only returns once the consumers have been halted.
    ///
    /// # Errors
    /// Returns [`DisruptorError::ThreadPanicked`] for the first thread that
    /// panicked; the remaining threads are still joined.
    pub fn join_all(&self) -> Result<()> {
        let threads = std::mem::take(&mut *self.threads.lock());
        let mut outcome = Ok(());
        for thread in threads {
            let name = thread.thread_name().to_string();
            let joined = thread.join();
            debug!(thread = %name, ok = joined.is_ok(), "joined consumer thread");
            if outcome.is_ok() {
                outcome = joined;
            }
        }
        outcome
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut builder =
            ThreadBuilder::new().thread_name(format!("{}-{index}", self.thread_name_prefix));

        if !self.cores.is_empty() {
            builder = builder.pin_at_core(self.cores[index % self.cores.len()])?;
        }

        let thread = builder.spawn(task)?;
        debug!(thread = thread.thread_name(), "spawned consumer thread");
        self.threads.lock().push(thread);
        Ok(())
    }
}

/// Runs each task with `spawn_blocking` on a Tokio runtime
#[derive(Debug)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Use the runtime the caller is running on
    ///
    /// # Errors
    /// Returns [`DisruptorError::InvalidConfiguration`] outside a runtime.
    pub fn current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|error| DisruptorError::InvalidConfiguration(error.to_string()))?;
        Ok(Self::new(handle))
    }

    /// Await every submitted task
    ///
    /// # Errors
    /// Returns [`DisruptorError::ThreadPanicked`] for the first task that
    /// panicked or was cancelled.
    pub async fn join_all(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut outcome = Ok(());
        for (index, task) in tasks.into_iter().enumerate() {
            if let Err(error) = task.await {
                if outcome.is_ok() {
                    outcome = Err(DisruptorError::ThreadPanicked(format!(
                        "blocking task {index}: {error}"
                    )));
                }
            }
        }
        outcome
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let join_handle = self.handle.spawn_blocking(task);
        self.tasks.lock().push(join_handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_thread_executor_names_threads() {
        let executor = ThreadExecutor::new("stage");
        let names = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let names = Arc::clone(&names);
            executor
                .execute(Box::new(move || {
                    let name = std::thread::current().name().map(str::to_string);
                    names.lock().push(name);
                }))
                .unwrap();
        }
        executor.join_all().unwrap();

        let mut names = names.lock().clone();
        names.sort();
        assert_eq!(
            names,
            vec![Some("stage-0".to_string()), Some("stage-1".to_string())]
        );
        assert_eq!(executor.spawned(), 2);
    }

    #[test]
    fn test_thread_executor_reports_panics() {
        let executor = ThreadExecutor::new("panicky");
        executor.execute(Box::new(|| panic!("boom"))).unwrap();
        assert!(matches!(
            executor.join_all(),
            Err(DisruptorError::ThreadPanicked(_))
        ));
    }

    #[test]
    #[cfg(not(miri))]
    fn test_thread_executor_with_pinning() {
        let executor = ThreadExecutor::new("pinned").with_core_pinning();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .execute(Box::new(move || flag.store(true, Ordering::Release)))
            .unwrap();
        executor.join_all().unwrap();
        assert!(ran.load(Ordering::Acquire));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_executor_runs_blocking_tasks() {
        let executor = TokioExecutor::current().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        executor
            .execute(Box::new(move || flag.store(true, Ordering::Release)))
            .unwrap();
        executor.join_all().await.unwrap();
        assert!(ran.load(Ordering::Acquire));
    }

    #[test]
    fn test_tokio_executor_requires_runtime() {
        assert!(matches!(
            TokioExecutor::current(),
            Err(DisruptorError::InvalidConfiguration(_))
        ));
    }
}
