//! Book keeper
//!
//! Buffers issued decisions and moves them to the persistence store in
//! sequence order. A flush copies the buffer under its lock, writes the copy
//! in transactions of at most `batch_size` rows, and removes from the buffer
//! only what each committed transaction contained. A failed transaction
//! leaves its decisions (and everything after them) buffered for the next
//! flush.
//!
//! Decisions are recorded in sequence order, so the copy is always every
//! buffered decision up to some sequence. The store therefore only ever
//! holds a prefix of the issued log, minus reversed decisions.
//!
//! Only one flush runs at a time. `remove` and `clear` take the same lock,
//! so a decision withdrawn from the log cannot be written back by a flush
//! that snapshotted it earlier.

use crate::codec::DecisionRow;
use crate::store::PersistenceStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tally_core::{Decision, Sequence, TallyError, TallyResult};
use tracing::debug;

const OUTCOME_NONE: u8 = 0;
const OUTCOME_SUCCESS: u8 = 1;
const OUTCOME_FAILURE: u8 = 2;

/// Snapshot of flush activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurabilityCounters {
    /// Flushes that completed without error
    pub flushes: u64,
    /// Decisions written by those flushes
    pub decisions_flushed: u64,
    /// Flushes that stopped on a store error
    pub failed_flushes: u64,
    /// Highest sequence known to be in the store
    pub last_durable: Sequence,
}

/// Buffer between the decision maker and the persistence store
pub struct BookKeeper {
    buffer: Mutex<BTreeMap<Sequence, Decision>>,
    store: Arc<dyn PersistenceStore>,
    batch_size: usize,
    flush_lock: Mutex<()>,
    flushes: AtomicU64,
    decisions_flushed: AtomicU64,
    failed_flushes: AtomicU64,
    last_durable: AtomicU64,
    outcome: AtomicU8,
}

impl BookKeeper {
    /// Create a book keeper writing to `store`
    pub fn new(store: Arc<dyn PersistenceStore>, batch_size: usize) -> TallyResult<Self> {
        if batch_size == 0 {
            return Err(TallyError::invalid_input("batch_size must be at least 1"));
        }
        let last = store.last_sequence()?;
        Ok(Self {
            buffer: Mutex::new(BTreeMap::new()),
            store,
            batch_size,
            flush_lock: Mutex::new(()),
            flushes: AtomicU64::new(0),
            decisions_flushed: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            last_durable: AtomicU64::new(last.as_u64()),
            outcome: AtomicU8::new(OUTCOME_NONE),
        })
    }

    /// Queue a decision for the next flush
    pub fn record(&self, decision: Decision) {
        self.buffer.lock().insert(decision.sequence(), decision);
    }

    /// Write every buffered decision to the store
    ///
    /// Returns the number of decisions written.
    pub fn flush(&self) -> TallyResult<usize> {
        let _guard = self.flush_lock.lock();

        let pending: Vec<Decision> = self.buffer.lock().values().cloned().collect();

        let mut written = 0;
        for chunk in pending.chunks(self.batch_size) {
            if let Err(e) = self.store.insert_batch(chunk) {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                self.outcome.store(OUTCOME_FAILURE, Ordering::Release);
                self.decisions_flushed
                    .fetch_add(written as u64, Ordering::Relaxed);
                return Err(e);
            }
            {
                let mut buffer = self.buffer.lock();
                for decision in chunk {
                    buffer.remove(&decision.sequence());
                }
            }
            if let Some(last) = chunk.last() {
                self.last_durable
                    .fetch_max(last.sequence().as_u64(), Ordering::AcqRel);
            }
            written += chunk.len();
        }

        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.decisions_flushed
            .fetch_add(written as u64, Ordering::Relaxed);
        self.outcome.store(OUTCOME_SUCCESS, Ordering::Release);
        if written > 0 {
            debug!(
                written,
                last_durable = self.last_durable.load(Ordering::Acquire),
                "flush complete"
            );
        }
        Ok(written)
    }

    /// Whether any flush has finished, successfully or not
    pub fn has_run(&self) -> bool {
        self.outcome.load(Ordering::Acquire) != OUTCOME_NONE
    }

    /// Whether the most recent flush succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.load(Ordering::Acquire) == OUTCOME_SUCCESS
    }

    /// Whether the most recent flush failed
    pub fn is_failure(&self) -> bool {
        self.outcome.load(Ordering::Acquire) == OUTCOME_FAILURE
    }

    /// Highest sequence in the store
    pub fn last_durable(&self) -> TallyResult<Sequence> {
        self.store.last_sequence()
    }

    /// Durable decisions with sequence in `start..=end`
    pub fn read_range(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<Decision>> {
        self.store.read_range(start, end)
    }

    /// Durable rows with sequence in `start..=end`, undecoded
    pub fn read_rows(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<DecisionRow>> {
        self.store.read_rows(start, end)
    }

    /// Withdraw a decision from the buffer and the store
    ///
    /// Returns true if it was found in either.
    pub fn remove(&self, decision: &Decision) -> TallyResult<bool> {
        let _guard = self.flush_lock.lock();
        let buffered = self.buffer.lock().remove(&decision.sequence()).is_some();
        let stored = self.store.remove(decision.sequence())?;
        if stored {
            self.last_durable
                .store(self.store.last_sequence()?.as_u64(), Ordering::Release);
        }
        Ok(buffered || stored)
    }

    /// Drop every buffered and stored decision
    ///
    /// Returns the number of stored rows deleted.
    pub fn clear(&self) -> TallyResult<u64> {
        let _guard = self.flush_lock.lock();
        self.buffer.lock().clear();
        let deleted = self.store.clear()?;
        self.last_durable
            .store(self.store.last_sequence()?.as_u64(), Ordering::Release);
        Ok(deleted)
    }

    /// Decisions waiting for a flush
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Rows per transaction
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reclaim store space
    pub fn compact(&self) -> TallyResult<()> {
        let _guard = self.flush_lock.lock();
        self.store.compact()
    }

    /// Flush what is buffered, then close the store
    ///
    /// The store is closed even when the flush fails; the flush error is
    /// returned in that case and the unwritten decisions stay buffered.
    pub fn close(&self) -> TallyResult<()> {
        let flushed = self.flush();
        let closed = self.store.close();
        flushed?;
        closed
    }

    /// Current counters
    pub fn counters(&self) -> DurabilityCounters {
        DurabilityCounters {
            flushes: self.flushes.load(Ordering::Relaxed),
            decisions_flushed: self.decisions_flushed.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            last_durable: Sequence::new(self.last_durable.load(Ordering::Acquire)),
        }
    }
}

impl std::fmt::Debug for BookKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookKeeper")
            .field("buffered", &self.buffered_len())
            .field("batch_size", &self.batch_size)
            .field("counters", &self.counters())
            .finish()
    }
}
