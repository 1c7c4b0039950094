//! Startup replay
//!
//! Rebuilds memory from the decision log. Decisions are read in pages of at
//! most `batch_size` rows and applied in ascending sequence order through the
//! same path as live writes; nothing is re-logged. A decision that cannot be
//! decoded or applied is skipped and listed in the [`RecoveryReport`] under
//! [`RecoveryMode::Lenient`], or aborts recovery under
//! [`RecoveryMode::Strict`].

use crate::records::Records;
use tally_core::{RecoveryMode, Sequence, TallyError, TallyResult};
use tally_durability::{codec, BookKeeper};
use tracing::{info, warn};

/// What a replay did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Decisions applied
    pub replayed: u64,
    /// Decisions skipped, with the reason
    pub skipped: Vec<(Sequence, String)>,
    /// Highest sequence in the log when replay started
    pub last_sequence: Sequence,
}

impl RecoveryReport {
    /// True when every logged decision was applied
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Replays the decision log into memory
pub struct DataInitializer<'a> {
    records: &'a Records,
    book_keeper: &'a BookKeeper,
    mode: RecoveryMode,
}

impl<'a> DataInitializer<'a> {
    pub fn new(records: &'a Records, book_keeper: &'a BookKeeper, mode: RecoveryMode) -> Self {
        Self {
            records,
            book_keeper,
            mode,
        }
    }

    /// Replay `1..=last_durable`
    ///
    /// # Errors
    ///
    /// `PersistenceFailure` if a page cannot be read. In strict mode,
    /// `RecoveryReplayFailure` for the first decision that fails.
    pub fn initialize(&self) -> TallyResult<RecoveryReport> {
        let last = self.book_keeper.last_durable()?;
        let page = self.book_keeper.batch_size() as u64;
        let mut report = RecoveryReport {
            last_sequence: last,
            ..RecoveryReport::default()
        };

        let mut start = 1;
        while start <= last.as_u64() {
            let end = (start + page - 1).min(last.as_u64());
            let rows = self
                .book_keeper
                .read_rows(Sequence::new(start), Sequence::new(end))?;

            for row in rows {
                let sequence = row.sequence();
                let outcome = codec::decode(row).and_then(|d| self.records.apply(&d));
                match outcome {
                    Ok(_) => report.replayed += 1,
                    Err(e) => self.skip(&mut report, sequence, e)?,
                }
            }
            start = end + 1;
        }

        if report.is_clean() {
            info!(replayed = report.replayed, last = %last, "recovery complete");
        } else {
            warn!(
                replayed = report.replayed,
                skipped = report.skipped.len(),
                last = %last,
                "recovery complete with skipped decisions"
            );
        }
        Ok(report)
    }

    fn skip(
        &self,
        report: &mut RecoveryReport,
        sequence: Sequence,
        error: TallyError,
    ) -> TallyResult<()> {
        match self.mode {
            RecoveryMode::Strict => Err(TallyError::replay_failure(sequence, error.to_string())),
            RecoveryMode::Lenient => {
                warn!(sequence = %sequence, error = %error, "skipping decision during replay");
                report.skipped.push((sequence, error.to_string()));
                Ok(())
            }
        }
    }
}
