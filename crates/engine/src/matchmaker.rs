//! Matchmaker
//!
//! Keeps records linked to the records they name in `related_ids`, whatever
//! order they arrive in. A relation whose target is not stored yet is parked
//! in `singles` under the missing id. When a record with that id is written,
//! [`Matchmaker::bachelor`] links every parked referrer to it and drops the
//! entry.
//!
//! Invariant: `singles[id]` holds only occupied references whose record
//! declares `id` and which are not linked to a record with that id.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tally_core::{Data, MemoryReference, TallyResult};
use tally_storage::{IdentityIndex, MemoryOperations};
use tracing::{debug, warn};

/// Relationship resolver with pending forward references
pub struct Matchmaker {
    ops: MemoryOperations,
    index: Arc<IdentityIndex>,
    singles: DashMap<String, BTreeSet<MemoryReference>>,
}

impl Matchmaker {
    pub fn new(ops: MemoryOperations, index: Arc<IdentityIndex>) -> Self {
        Self {
            ops,
            index,
            singles: DashMap::new(),
        }
    }

    /// Link `reference` to each record `data` relates to
    ///
    /// Relations that cannot be resolved yet are parked. Returns the number of
    /// links created.
    pub fn match_record(&self, reference: MemoryReference, data: &Data) -> TallyResult<usize> {
        let mut linked = 0;
        for related in &data.related_ids {
            match self.index.reference_of(related) {
                Some(target) => {
                    if self.ops.link(reference, target)? {
                        linked += 1;
                    }
                }
                None => {
                    self.singles
                        .entry(related.clone())
                        .or_default()
                        .insert(reference);
                    debug!(reference = %reference, waiting_for = %related, "relation parked");
                }
            }
        }
        Ok(linked)
    }

    /// Link every reference waiting for `data_id` to its new home
    ///
    /// Returns the number of links created.
    pub fn bachelor(&self, data_id: &str, reference: MemoryReference) -> TallyResult<usize> {
        let Some((_, waiting)) = self.singles.remove(data_id) else {
            return Ok(0);
        };

        let mut linked = 0;
        for source in waiting {
            if !self.ops.is_occupied(source)? {
                warn!(source = %source, data_id, "dropping parked relation from empty location");
                continue;
            }
            if self.ops.link(source, reference)? {
                linked += 1;
            }
        }
        if linked > 0 {
            debug!(reference = %reference, data_id, linked, "parked relations resolved");
        }
        Ok(linked)
    }

    /// Replace the relations of `reference` declared by `old` with those of `new`
    pub fn revow(&self, reference: MemoryReference, old: &Data, new: &Data) -> TallyResult<usize> {
        self.withdraw(reference, &old.related_ids);
        for related in &old.related_ids {
            if let Some(target) = self.index.reference_of(related) {
                self.ops.delink(reference, target)?;
            }
        }
        self.match_record(reference, new)
    }

    /// Cut `reference` off from every neighbor ahead of its removal
    ///
    /// Its own parked relations are withdrawn. Records that pointed at it are
    /// parked under `data.id` again so they relink if the id is re-created.
    /// Returns the number of referrers parked.
    pub fn separate(&self, reference: MemoryReference, data: &Data) -> TallyResult<usize> {
        self.withdraw(reference, &data.related_ids);
        self.ops.delink_all(reference)?;

        let referrers: Vec<MemoryReference> = self
            .ops
            .dereference_all(reference)?
            .into_iter()
            .filter(|source| *source != reference)
            .collect();
        if !referrers.is_empty() {
            self.singles
                .entry(data.id.clone())
                .or_default()
                .extend(referrers.iter().copied());
        }
        Ok(referrers.len())
    }

    /// References waiting for `data_id`, ascending
    pub fn waiting_for(&self, data_id: &str) -> Vec<MemoryReference> {
        self.singles
            .get(data_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of ids with parked relations
    pub fn pending_len(&self) -> usize {
        self.singles.len()
    }

    /// Drop every parked relation
    pub fn clear(&self) {
        self.singles.clear();
    }

    fn withdraw(&self, reference: MemoryReference, related_ids: &[String]) {
        for related in related_ids {
            if let Some(mut set) = self.singles.get_mut(related) {
                set.remove(&reference);
            }
            self.singles.remove_if(related, |_, set| set.is_empty());
        }
    }
}

impl std::fmt::Debug for Matchmaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matchmaker")
            .field("pending", &self.singles.len())
            .finish()
    }
}
