//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer waits inside
//! [`SequenceBarrier::wait_for`] until the sequence it asked for becomes
//! available. Every strategy checks the barrier's alert flag on each iteration
//! so a halt is always observed without waiting for another publish.

use crate::disruptor::{DisruptorError, Result, Sequence, SequenceBarrier, SequenceGroup};
use parking_lot::{Condvar, Mutex};
use std::hint;
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Strategy for waiting for a sequence to become available
///
/// `cursor` is the producer cursor, `dependents` are the sequences the
/// consumer must not overtake (the cursor itself when it has no upstream
/// consumers). The returned value is `dependents.get()` at the moment it
/// reached `sequence`, which may be higher than requested.
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait for the given sequence to become available
    ///
    /// # Errors
    /// Returns [`DisruptorError::Alert`] when the barrier is alerted and
    /// [`DisruptorError::Timeout`] for strategies with a deadline.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64>;

    /// Wake every consumer blocked in this strategy
    ///
    /// Called by the sequencer on every publish and by barriers on alert.
    fn signal_all_when_blocking(&self);
}

/// Spin on the dependents until they reach `sequence`
#[inline]
fn spin_on_dependents(
    sequence: i64,
    dependents: &SequenceGroup,
    barrier: &dyn SequenceBarrier,
) -> Result<i64> {
    loop {
        let available = dependents.get();
        if available >= sequence {
            return Ok(available);
        }
        barrier.check_alert()?;
        hint::spin_loop();
    }
}

/// Busy-spin wait strategy
///
/// Lowest latency, burns a full core while waiting. Use it only when consumer
/// threads can be pinned to dedicated cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        spin_on_dependents(sequence, dependents, barrier)
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy
///
/// Spins for a number of tries, then yields the thread between checks.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    const DEFAULT_SPIN_TRIES: u32 = 100;

    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            let available = dependents.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy
///
/// Backs off in three phases: spin, then yield, then sleep for
/// `sleep_duration` between checks. Trades latency for an idle core.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

    pub fn new() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            sleep_duration: Self::DEFAULT_SLEEP,
        }
    }

    /// Create a sleeping strategy with custom retries and sleep duration
    pub fn with_backoff(retries: u32, sleep_duration: Duration) -> Self {
        Self {
            retries,
            sleep_duration,
        }
    }

    #[inline]
    fn apply_wait_method(&self, counter: u32) -> u32 {
        let yield_threshold = self.retries / 2;
        if counter > yield_threshold {
            hint::spin_loop();
            counter - 1
        } else if counter > 0 {
            thread::yield_now();
            counter - 1
        } else {
            thread::sleep(self.sleep_duration);
            counter
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let mut counter = self.retries;
        loop {
            let available = dependents.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            counter = self.apply_wait_method(counter);
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Blocking wait strategy
///
/// Parks consumers on a condition variable until the producer cursor reaches
/// the requested sequence; every publish wakes all waiters. Upstream consumer
/// sequences do not signal, so the final wait on dependents spins.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependents(sequence, dependents, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait strategy that skips the lock when nobody is waiting
///
/// Waiters announce themselves through `signal_needed` before parking, so a
/// publish with no blocked consumer costs one atomic swap instead of a lock.
#[derive(Debug, Default)]
pub struct LiteBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            loop {
                self.signal_needed.store(true, Ordering::SeqCst);
                // Pairs with the fence in signal_all_when_blocking.
                fence(Ordering::SeqCst);
                if cursor.get() >= sequence {
                    break;
                }
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependents(sequence, dependents, barrier)
    }

    fn signal_all_when_blocking(&self) {
        fence(Ordering::SeqCst);
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

/// Blocking wait strategy with a deadline
///
/// Behaves like [`BlockingWaitStrategy`] but gives up with
/// [`DisruptorError::Timeout`] once `timeout` has elapsed. The timeout is
/// retryable: processors report it to their handler and wait again.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        barrier: &dyn SequenceBarrier,
    ) -> Result<i64> {
        let deadline = Instant::now() + self.timeout;

        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out()
                    && cursor.get() < sequence
                {
                    return Err(DisruptorError::Timeout);
                }
            }
        }

        loop {
            let available = dependents.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            if Instant::now() >= deadline {
                return Err(DisruptorError::Timeout);
            }
            hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}
