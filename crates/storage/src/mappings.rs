//! Identity index
//!
//! Maps external record ids and decision sequences to the reference that
//! currently holds the record.
//!
//! # Design
//!
//! - DashMap: sharded, lock-free reads
//! - FxHash: fast non-crypto hash for short string ids and integers
//! - Two maps kept in step: exactly one entry by id and one by sequence per
//!   live record. The sequence entry always names the decision that last
//!   wrote the record.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use tally_core::{MemoryReference, Sequence};

type FxBuild = BuildHasherDefault<FxHasher>;

/// Record id / sequence → reference lookup
pub struct IdentityIndex {
    by_id: DashMap<String, (Sequence, MemoryReference), FxBuild>,
    by_sequence: DashMap<Sequence, MemoryReference, FxBuild>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::with_hasher(FxBuild::default()),
            by_sequence: DashMap::with_hasher(FxBuild::default()),
        }
    }

    /// Register a newly written record
    ///
    /// Replaces any previous entry for the same id.
    pub fn insert(&self, id: &str, sequence: Sequence, reference: MemoryReference) {
        if let Some((old_sequence, _)) = self.by_id.insert(id.to_string(), (sequence, reference)) {
            self.by_sequence.remove(&old_sequence);
        }
        self.by_sequence.insert(sequence, reference);
    }

    /// Move a record's sequence entry after an update
    ///
    /// Returns false if the id is unknown.
    pub fn resequence(&self, id: &str, sequence: Sequence) -> bool {
        let Some(mut entry) = self.by_id.get_mut(id) else {
            return false;
        };
        let (old_sequence, reference) = *entry;
        *entry = (sequence, reference);
        drop(entry);

        self.by_sequence.remove(&old_sequence);
        self.by_sequence.insert(sequence, reference);
        true
    }

    /// Remove a record's entries, returning its reference
    pub fn remove(&self, id: &str) -> Option<MemoryReference> {
        let (_, (sequence, reference)) = self.by_id.remove(id)?;
        self.by_sequence.remove(&sequence);
        Some(reference)
    }

    /// Reference holding the record with this id
    #[inline]
    pub fn reference_of(&self, id: &str) -> Option<MemoryReference> {
        self.by_id.get(id).map(|entry| entry.value().1)
    }

    /// Sequence of the decision that last wrote this id
    #[inline]
    pub fn sequence_of(&self, id: &str) -> Option<Sequence> {
        self.by_id.get(id).map(|entry| entry.value().0)
    }

    /// Reference holding the record last written by this sequence
    #[inline]
    pub fn reference_at(&self, sequence: Sequence) -> Option<MemoryReference> {
        self.by_sequence.get(&sequence).map(|entry| *entry.value())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Live `(sequence, reference)` pairs with sequence in `start..=end`, ascending
    pub fn sequences_in(&self, start: Sequence, end: Sequence) -> Vec<(Sequence, MemoryReference)> {
        let mut out: Vec<_> = self
            .by_sequence
            .iter()
            .filter(|entry| *entry.key() >= start && *entry.key() <= end)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        out.sort_unstable();
        out
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&self) {
        self.by_id.clear();
        self.by_sequence.clear();
    }
}

impl Default for IdentityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdentityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityIndex")
            .field("ids", &self.by_id.len())
            .field("sequences", &self.by_sequence.len())
            .finish()
    }
}
