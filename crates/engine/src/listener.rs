//! Extension points for collaborators
//!
//! Secondary indexes subscribe with a [`ChangeListener`]; embedding
//! applications observe open, shutdown and wipe with a [`LifecycleHook`].
//! Both are called synchronously on the writer's thread while the writer
//! lock is held, so they must not write to the database themselves.

use crate::database::Database;
use tally_core::GraphData;

/// Notified after every successful memory write
///
/// `old` is absent for a create, `new` is absent for a delete.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, old: Option<&GraphData>, new: Option<&GraphData>);
}

/// Notified at lifecycle boundaries
///
/// Every method defaults to doing nothing.
pub trait LifecycleHook: Send + Sync {
    /// After recovery, before the handle is returned from `open`
    fn on_startup(&self, _db: &Database) {}

    /// After the final flush, before identity tables are reset
    fn on_shutdown(&self, _db: &Database) {}

    /// After the log and memory have been wiped by `clear_all`
    fn on_clear_all(&self, _db: &Database) {}
}
