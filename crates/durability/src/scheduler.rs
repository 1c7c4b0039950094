//! Periodic flush thread
//!
//! One named thread per store wakes every `interval` (or when poked) and
//! flushes the book keeper. Store failures are logged and left for the next
//! tick; any other failure stops the periodic loop, leaving the decisions
//! buffered for an explicit flush. `shutdown` stops the loop, runs one final
//! flush on the thread and joins it; dropping the scheduler does the same.

use crate::bookkeeper::BookKeeper;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tally_core::{TallyError, TallyResult};
use tracing::{debug, error, warn};

struct Signal {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Background flusher for a [`BookKeeper`]
pub struct FlushScheduler {
    signal: Arc<Signal>,
    handle: Mutex<Option<JoinHandle<TallyResult<usize>>>>,
    interval: Duration,
}

impl FlushScheduler {
    /// Spawn the flush thread
    pub fn start(book_keeper: Arc<BookKeeper>, interval: Duration) -> TallyResult<Self> {
        let signal = Arc::new(Signal {
            stop: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("tally-flush".to_string())
            .spawn(move || run(&book_keeper, &thread_signal, interval))
            .map_err(|e| TallyError::persistence_with_source("cannot spawn flush thread", e))?;

        debug!(interval_ms = interval.as_millis() as u64, "flush scheduler started");
        Ok(Self {
            signal,
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    /// Flush period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Wake the thread for an early flush
    pub fn wake(&self) {
        self.signal.wake.notify_one();
    }

    /// Stop the thread after one final flush
    ///
    /// Returns the number of decisions the final flush wrote. Calling it again
    /// is a no-op returning 0.
    pub fn shutdown(&self) -> TallyResult<usize> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(0);
        };
        *self.signal.stop.lock() = true;
        self.signal.wake.notify_all();

        handle
            .join()
            .map_err(|_| TallyError::persistence("flush thread panicked"))?
    }
}

fn run(book_keeper: &BookKeeper, signal: &Signal, interval: Duration) -> TallyResult<usize> {
    let mut stop = signal.stop.lock();
    while !*stop {
        signal.wake.wait_for(&mut stop, interval);
        if *stop {
            break;
        }
        let outcome = parking_lot::MutexGuard::unlocked(&mut stop, || book_keeper.flush());
        match outcome {
            Ok(_) => {}
            Err(e) if e.is_retryable() => error!(
                error = %e,
                buffered = book_keeper.buffered_len(),
                "scheduled flush failed; retrying next tick"
            ),
            Err(e) => {
                error!(
                    error = %e,
                    buffered = book_keeper.buffered_len(),
                    "scheduled flush failed; periodic flushing stopped"
                );
                break;
            }
        }
    }
    drop(stop);

    let written = book_keeper.flush().map_err(|e| {
        error!(error = %e, "final flush failed");
        e
    })?;
    debug!(written, "flush scheduler stopped");
    Ok(written)
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "flush scheduler shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
