//! Tally engine
//!
//! Wires memory, ordering and durability into one [`Database`] handle.
//!
//! - `matchmaker`: forward-reference resolution between records
//! - `records`: applying decisions to memory
//! - `recovery`: startup replay of the decision log
//! - `listener`: change listeners and lifecycle hooks
//! - `database`: the context object and its builder

#![warn(clippy::all)]

pub mod database;
pub mod listener;
pub mod matchmaker;
pub mod records;
pub mod recovery;

pub use database::{Database, DatabaseBuilder, DatabaseInfo};
pub use listener::{ChangeListener, LifecycleHook};
pub use matchmaker::Matchmaker;
pub use records::{Applied, Records};
pub use recovery::{DataInitializer, RecoveryReport};
