//! Decision maker
//!
//! Issues sequences and turns admitted requests into [`Decision`]s. The
//! counter sits behind a mutex so sequences are handed out strictly one
//! greater than the last, with no gaps, however many threads call
//! `decide`. Every decision is passed to the book keeper before `decide`
//! returns.

use crate::context::RequestContext;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tally_core::{Decision, InternTable, Sequence, TallyError, TallyResult};
use tally_durability::BookKeeper;
use tracing::{debug, info};

/// Source of the total order
pub struct DecisionMaker {
    sequences: InternTable<Sequence>,
    latest: Mutex<Sequence>,
    book_keeper: Arc<BookKeeper>,
}

impl DecisionMaker {
    /// Create a decision maker continuing from the last durable sequence
    pub fn new(book_keeper: Arc<BookKeeper>) -> TallyResult<Self> {
        let latest = book_keeper.last_durable()?;
        Ok(Self {
            sequences: InternTable::new(),
            latest: Mutex::new(latest),
            book_keeper,
        })
    }

    /// Assign the next sequence to `context` and log the decision
    ///
    /// # Errors
    ///
    /// `UnsupportedRequest` if the request type is absent or `Read`.
    pub fn decide(&self, context: &RequestContext) -> TallyResult<Decision> {
        let request_type = match context.request_type {
            Some(t) if t.is_mutation() => t,
            other => return Err(TallyError::unsupported_request(other)),
        };

        let mut latest = self.latest.lock();
        let sequence = *self.sequences.canonical(latest.next().as_u64());
        let decision = Decision::new(sequence, Utc::now(), request_type, context.data.clone());
        self.book_keeper.record(decision.clone());
        *latest = sequence;

        debug!(
            sequence = %sequence,
            request_type = %request_type,
            data_id = %context.data.id,
            "decision issued"
        );
        Ok(decision)
    }

    /// Highest sequence issued so far, `ZERO` if none
    pub fn latest_decision(&self) -> Sequence {
        *self.latest.lock()
    }

    /// Durable decisions with sequence in `start..=end`
    pub fn read_range(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<Decision>> {
        self.book_keeper.read_range(start, end)
    }

    /// Withdraw one decision from the log
    ///
    /// The counter is left where it is; the sequence is never reissued.
    pub fn reverse(&self, decision: &Decision) -> TallyResult<bool> {
        let removed = self.book_keeper.remove(decision)?;
        if removed {
            debug!(sequence = %decision.sequence(), "decision reversed");
        }
        Ok(removed)
    }

    /// Wipe the log and rewind the counter to what the store still holds
    ///
    /// Returns the number of durable decisions removed.
    pub fn reverse_all(&self) -> TallyResult<u64> {
        let mut latest = self.latest.lock();
        let removed = self.book_keeper.clear()?;
        let rewound = self.book_keeper.last_durable()?;
        *latest = rewound;
        self.sequences.reset();
        info!(removed, latest = %rewound, "decision log reversed");
        Ok(removed)
    }

    /// Decisions per flush batch and per recovery page
    pub fn batch_size(&self) -> usize {
        self.book_keeper.batch_size()
    }

    /// Canonical sequence for `id`
    ///
    /// # Errors
    ///
    /// `InvalidReference` for a negative id or one not issued yet.
    pub fn sequence(&self, id: i64) -> TallyResult<Arc<Sequence>> {
        self.issued(id)?;
        self.sequences.value_of(id)
    }

    /// Canonical sequences for `start..=end`
    pub fn sequence_range(&self, start: i64, end: i64) -> TallyResult<Vec<Arc<Sequence>>> {
        self.issued(end)?;
        self.sequences.range_of(start, end)
    }

    /// Number of canonical sequences cached
    pub fn interned(&self) -> usize {
        self.sequences.len()
    }

    /// The book keeper decisions are forwarded to
    pub fn book_keeper(&self) -> &Arc<BookKeeper> {
        &self.book_keeper
    }

    /// Forget canonical sequences; the counter is kept
    pub fn reset(&self) {
        self.sequences.reset();
    }

    fn issued(&self, id: i64) -> TallyResult<()> {
        let latest = self.latest_decision();
        match u64::try_from(id) {
            Ok(id) if id > latest.as_u64() => Err(TallyError::invalid_reference(format!(
                "sequence {} has not been issued; latest is {}",
                id, latest
            ))),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for DecisionMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionMaker")
            .field("latest", &self.latest_decision())
            .field("interned", &self.interned())
            .finish()
    }
}
