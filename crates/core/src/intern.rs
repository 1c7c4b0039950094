//! Identity tables for canonical references and sequences
//!
//! An [`InternTable`] hands out exactly one shared instance per numeric id,
//! so two lookups of the same id can be compared with `Arc::ptr_eq`. Tables
//! are owned by the component that issues the ids (the memory manager for
//! references, the decision maker for sequences) and are cleared with
//! [`InternTable::reset`] at shutdown. Nothing survives a restart: after
//! recovery every instance is rebuilt from replayed decisions.
//!
//! # Thread Safety
//!
//! Allocation goes through `DashMap::entry`, which holds the shard lock while
//! the value is created. Two concurrent callers asking for the same id always
//! receive the same `Arc`.

use crate::error::{TallyError, TallyResult};
use crate::types::Identity;
use dashmap::DashMap;
use std::sync::Arc;

/// Table of canonical identity instances keyed by numeric id
#[derive(Debug)]
pub struct InternTable<T: Identity> {
    entries: DashMap<u64, Arc<T>>,
}

impl<T: Identity> InternTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the canonical instance for `id`
    ///
    /// # Errors
    ///
    /// `InvalidReference` if `id` is negative.
    pub fn value_of(&self, id: i64) -> TallyResult<Arc<T>> {
        let id = Self::validate(id)?;
        Ok(self.canonical(id))
    }

    /// Canonical instance for an id already known to be non-negative
    pub fn canonical(&self, id: u64) -> Arc<T> {
        self.entries
            .entry(id)
            .or_insert_with(|| Arc::new(T::from_id(id)))
            .value()
            .clone()
    }

    /// Canonical instances for `start..=end`, ascending
    ///
    /// # Errors
    ///
    /// `InvalidReference` if either bound is negative or `end < start`.
    pub fn range_of(&self, start: i64, end: i64) -> TallyResult<Vec<Arc<T>>> {
        let start = Self::validate(start)?;
        let end = Self::validate(end)?;
        if end < start {
            return Err(TallyError::invalid_reference(format!(
                "{} range end {} precedes start {}",
                T::KIND,
                end,
                start
            )));
        }
        Ok((start..=end).map(|id| self.canonical(id)).collect())
    }

    /// Look up an instance without allocating one
    pub fn get(&self, id: u64) -> Option<Arc<T>> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of canonical instances currently cached
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been interned since creation or the last reset
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached instance
    ///
    /// Instances handed out before the reset stay valid values but are no
    /// longer canonical: the next `value_of` returns a fresh `Arc`.
    pub fn reset(&self) {
        self.entries.clear();
    }

    fn validate(id: i64) -> TallyResult<u64> {
        u64::try_from(id).map_err(|_| {
            TallyError::invalid_reference(format!("negative {} id {}", T::KIND, id))
        })
    }
}

impl<T: Identity> Default for InternTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
