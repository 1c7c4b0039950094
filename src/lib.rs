//! TallyDB: an embeddable in-memory record store with an ordered, durable
//! decision log.
//!
//! Every create, update and delete becomes a [`Decision`] with the next
//! [`Sequence`]. Decisions are applied to managed memory immediately and
//! flushed to SQLite in the background; on open the log is replayed to
//! rebuild memory.
//!
//! ```ignore
//! use tallydb::{Data, Database, TallyConfig};
//!
//! let db = Database::builder()
//!     .config(TallyConfig::new().store_location("decisions.db"))
//!     .open()?;
//! db.create(Data::new("order-1").with_related(["customer-9"]))?;
//! db.create(Data::new("customer-9"))?;
//! let order = db.read_by_id("order-1")?.unwrap();
//! assert_eq!(order.related.links[0].data.id, "customer-9");
//! ```

pub mod types;

pub use types::*;

pub use tally_engine::{
    Applied, ChangeListener, DataInitializer, Database, DatabaseBuilder, DatabaseInfo,
    LifecycleHook, Matchmaker, Records, RecoveryReport,
};

/// Lower layers, for collaborators that need more than the database handle
pub mod layers {
    pub use tally_concurrency as concurrency;
    pub use tally_core as core;
    pub use tally_durability as durability;
    pub use tally_storage as storage;
}
