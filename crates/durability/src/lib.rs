//! Durability for Tally
//!
//! Decisions issued by the decision maker are buffered by the [`BookKeeper`]
//! and written to a [`PersistenceStore`] by the [`FlushScheduler`]. On
//! restart the store is the only input to recovery.
//!
//! - `codec`: decision ↔ row encoding
//! - `store`: the store trait and its SQLite implementation
//! - `bookkeeper`: buffer, batched flush, counters
//! - `scheduler`: periodic flush thread

#![warn(clippy::all)]

pub mod bookkeeper;
pub mod codec;
pub mod scheduler;
pub mod store;

pub use bookkeeper::{BookKeeper, DurabilityCounters};
pub use codec::DecisionRow;
pub use scheduler::FlushScheduler;
pub use store::{PersistenceStore, SqliteStore};
