//! Database context object
//!
//! A [`Database`] owns everything one store instance needs: memory, the
//! identity index, the matchmaker, the decision maker, the book keeper and
//! its flush thread. There are no process-wide registries; two databases in
//! one process are fully independent.
//!
//! # Write path
//!
//! Writes are serialized by a writer mutex: check, decide, apply, notify.
//! If applying fails after a sequence was issued, the decision is reversed
//! so neither memory nor the log keeps a trace of it. Reads never take the
//! writer mutex.
//!
//! # Lifecycle
//!
//! `open` validates the configuration, opens the store, replays the log,
//! starts the flush thread and runs `on_startup` hooks. `shutdown` stops the
//! flush thread after a final flush, runs `on_shutdown` hooks, closes the
//! store and resets the identity tables. It is idempotent and also runs on
//! drop.

use crate::listener::{ChangeListener, LifecycleHook};
use crate::records::Records;
use crate::recovery::{DataInitializer, RecoveryReport};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tally_concurrency::{DecisionMaker, RequestContext};
use tally_core::{
    Data, GraphData, MemoryReference, Sequence, TallyConfig, TallyError, TallyResult,
};
use tally_durability::{
    BookKeeper, DurabilityCounters, FlushScheduler, PersistenceStore, SqliteStore,
};
use tally_storage::MemoryManager;
use tracing::{debug, info, warn};

// ============================================================================
// Builder
// ============================================================================

/// Options for opening a [`Database`]
///
/// ```ignore
/// let db = DatabaseBuilder::new()
///     .config(TallyConfig::new().store_location("decisions.db"))
///     .listener(Arc::new(MyIndex::default()))
///     .open()?;
/// ```
#[derive(Default)]
pub struct DatabaseBuilder {
    config: TallyConfig,
    listeners: Vec<Arc<dyn ChangeListener>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration
    pub fn config(mut self, config: TallyConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe a change listener
    pub fn listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register a lifecycle hook
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Open the database described by the configuration
    pub fn open(self) -> TallyResult<Database> {
        self.config.validate()?;
        let store: Arc<dyn PersistenceStore> = match &self.config.store_location {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(SqliteStore::open_in_memory()?),
        };
        Database::with_store(self.config, store, self.listeners, self.hooks)
    }

    /// Open with an in-memory log regardless of `store_location`
    pub fn ephemeral(mut self) -> TallyResult<Database> {
        self.config.store_location = None;
        self.open()
    }

    /// Open over a caller-supplied store
    pub fn open_with_store(self, store: Arc<dyn PersistenceStore>) -> TallyResult<Database> {
        self.config.validate()?;
        Database::with_store(self.config, store, self.listeners, self.hooks)
    }
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

// ============================================================================
// Database
// ============================================================================

/// Point-in-time view of a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Records currently stored
    pub live_records: usize,
    /// Total number of references
    pub capacity: u64,
    /// Number of memory blocks
    pub block_count: usize,
    /// Highest sequence issued
    pub latest_sequence: Sequence,
    /// Highest sequence known to be durable
    pub durable_sequence: Sequence,
    /// Decisions waiting for a flush
    pub buffered_decisions: usize,
    /// Ids with relations still waiting for their target
    pub pending_relations: usize,
    /// Flush activity
    pub counters: DurabilityCounters,
}

/// One embedded store instance
pub struct Database {
    config: TallyConfig,
    manager: Arc<MemoryManager>,
    records: Records,
    decisions: DecisionMaker,
    book_keeper: Arc<BookKeeper>,
    scheduler: FlushScheduler,
    writer: Mutex<()>,
    listeners: Vec<Arc<dyn ChangeListener>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    recovery: RecoveryReport,
    closed: AtomicBool,
}

impl Database {
    /// Open a database logging to the SQLite file at `path`
    pub fn open(path: impl AsRef<Path>) -> TallyResult<Self> {
        DatabaseBuilder::new()
            .config(TallyConfig::new().store_location(path.as_ref()))
            .open()
    }

    /// Open a database with default settings and an in-memory log
    pub fn ephemeral() -> TallyResult<Self> {
        DatabaseBuilder::new().ephemeral()
    }

    /// Start building a database
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    fn with_store(
        config: TallyConfig,
        store: Arc<dyn PersistenceStore>,
        listeners: Vec<Arc<dyn ChangeListener>>,
        hooks: Vec<Arc<dyn LifecycleHook>>,
    ) -> TallyResult<Self> {
        let book_keeper = Arc::new(BookKeeper::new(store, config.batch_size)?);
        let manager = Arc::new(MemoryManager::from_config(&config)?);
        let records = Records::new(Arc::clone(&manager));

        let recovery =
            DataInitializer::new(&records, &book_keeper, config.recovery_mode).initialize()?;
        let decisions = DecisionMaker::new(Arc::clone(&book_keeper))?;
        let scheduler =
            FlushScheduler::start(Arc::clone(&book_keeper), config.flush_interval_duration())?;

        let db = Self {
            config,
            manager,
            records,
            decisions,
            book_keeper,
            scheduler,
            writer: Mutex::new(()),
            listeners,
            hooks,
            recovery,
            closed: AtomicBool::new(false),
        };

        for hook in &db.hooks {
            hook.on_startup(&db);
        }
        info!(
            live = db.records.len(),
            latest = %db.decisions.latest_decision(),
            store = ?db.config.store_location,
            "database opened"
        );
        Ok(db)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Decide and apply one request
    ///
    /// Returns the reference the request wrote, updated or freed.
    ///
    /// # Errors
    ///
    /// - `UnsupportedRequest` for a missing or `Read` request type
    /// - `InvalidInput` for a create of an existing id
    /// - `InvalidReference` for an update or delete of an unknown id
    /// - `CapacityExceeded` when memory is full
    pub fn write(&self, context: RequestContext) -> TallyResult<MemoryReference> {
        let _writer = self.writer.lock();
        self.ensure_open()?;

        self.records.check(context.request_type, &context.data)?;
        let decision = self.decisions.decide(&context)?;

        let applied = match self.records.apply(&decision) {
            Ok(applied) => applied,
            Err(e) => {
                let sequence = decision.sequence();
                if e.is_validation() {
                    debug!(sequence = %sequence, error = %e, "decision rejected by memory");
                } else {
                    warn!(sequence = %sequence, error = %e, "decision failed to apply");
                }
                if let Err(reverse_err) = self.decisions.reverse(&decision) {
                    warn!(
                        sequence = %decision.sequence(),
                        error = %reverse_err,
                        "could not reverse failed decision"
                    );
                }
                return Err(e);
            }
        };

        for listener in &self.listeners {
            listener.on_change(applied.old.as_ref(), applied.new.as_ref());
        }
        Ok(applied.reference)
    }

    /// Insert a new record
    pub fn create(&self, data: Data) -> TallyResult<MemoryReference> {
        self.write(RequestContext::create(data))
    }

    /// Overwrite an existing record
    pub fn update(&self, data: Data) -> TallyResult<MemoryReference> {
        let existing = self.records.read_by_id(&data.id)?;
        let mut context = RequestContext::update(data);
        context.existing = existing;
        self.write(context)
    }

    /// Remove the record with `id`
    pub fn delete(&self, id: &str) -> TallyResult<MemoryReference> {
        let existing = self.records.read_by_id(id)?;
        let data = existing
            .as_ref()
            .map(|g| g.data.clone())
            .unwrap_or_else(|| Data::new(id));
        let mut context = RequestContext::delete(data);
        context.existing = existing;
        self.write(context)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Record with external id `id`
    pub fn read_by_id(&self, id: &str) -> TallyResult<Option<GraphData>> {
        self.records.read_by_id(id)
    }

    /// Record last written by decision `sequence`
    ///
    /// # Errors
    ///
    /// `InvalidReference` for a negative sequence.
    pub fn read_by_sequence(&self, sequence: i64) -> TallyResult<Option<GraphData>> {
        self.records.read_by_sequence(Sequence::new(to_u64(sequence)?))
    }

    /// Record stored at `reference`
    ///
    /// # Errors
    ///
    /// `InvalidReference` for a negative or out-of-range reference.
    pub fn read_by_reference(&self, reference: i64) -> TallyResult<Option<GraphData>> {
        self.records
            .ops()
            .read_graph(MemoryReference::new(to_u64(reference)?))
    }

    /// Records stored at references `start..=end`, ascending
    pub fn filter_by_reference_range(&self, start: i64, end: i64) -> TallyResult<Vec<GraphData>> {
        let (start, end) = (to_u64(start)?, to_u64(end)?);
        self.records
            .ops()
            .filter_by_range(MemoryReference::new(start), MemoryReference::new(end))
    }

    /// Records last written by decisions `start..=end`, ascending by sequence
    pub fn filter_by_sequence_range(&self, start: i64, end: i64) -> TallyResult<Vec<GraphData>> {
        let (start, end) = (to_u64(start)?, to_u64(end)?);
        self.records
            .filter_by_sequence(Sequence::new(start), Sequence::new(end))
    }

    // ========================================================================
    // Log
    // ========================================================================

    /// Highest sequence issued
    pub fn latest_decision(&self) -> Sequence {
        self.decisions.latest_decision()
    }

    /// The decision maker
    pub fn decisions(&self) -> &DecisionMaker {
        &self.decisions
    }

    /// Write buffered decisions now and wait for the commit
    ///
    /// Returns the number of decisions written.
    pub fn flush(&self) -> TallyResult<usize> {
        self.book_keeper.flush()
    }

    /// Reclaim space in the decision store
    pub fn compact(&self) -> TallyResult<()> {
        self.ensure_open()?;
        self.book_keeper.compact()
    }

    /// What startup replay did
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Current sizes, sequences and flush counters
    pub fn info(&self) -> DatabaseInfo {
        let counters = self.book_keeper.counters();
        DatabaseInfo {
            live_records: self.records.len(),
            capacity: self.manager.capacity(),
            block_count: self.manager.blocks().len(),
            latest_sequence: self.decisions.latest_decision(),
            durable_sequence: counters.last_durable,
            buffered_decisions: self.book_keeper.buffered_len(),
            pending_relations: self.records.matchmaker().pending_len(),
            counters,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Wipe the decision log and every record
    ///
    /// Returns the number of durable decisions removed.
    pub fn clear_all(&self) -> TallyResult<u64> {
        let _writer = self.writer.lock();
        self.ensure_open()?;

        let removed = self.decisions.reverse_all()?;
        self.records.clear();
        for hook in &self.hooks {
            hook.on_clear_all(self);
        }
        info!(removed, "database cleared");
        Ok(removed)
    }

    /// Whether `shutdown` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flush, stop the flush thread, close the store
    ///
    /// Later writes fail; reads keep answering from memory.
    pub fn shutdown(&self) -> TallyResult<()> {
        let _writer = self.writer.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let flushed = self.scheduler.shutdown();
        for hook in &self.hooks {
            hook.on_shutdown(self);
        }
        let closed = self.book_keeper.close();

        self.decisions.reset();
        self.manager.references().reset();

        let flushed = flushed?;
        closed?;
        info!(final_flush = flushed, "database shut down");
        Ok(())
    }

    fn ensure_open(&self) -> TallyResult<()> {
        if self.is_closed() {
            return Err(TallyError::invalid_input("database is shut down"));
        }
        Ok(())
    }
}

fn to_u64(id: i64) -> TallyResult<u64> {
    u64::try_from(id).map_err(|_| TallyError::invalid_reference(format!("negative id {}", id)))
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "database shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("records", &self.records.len())
            .field("latest", &self.decisions.latest_decision())
            .field("closed", &self.is_closed())
            .finish()
    }
}
