//! Memory operations
//!
//! Facade over [`MemoryManager`] combining allocation with location state
//! changes and relationship bookkeeping.
//!
//! # Locking
//!
//! Every mutation takes the write lock of the location it changes. Operations
//! that touch two locations (link, delink) acquire the lower reference first,
//! so two writers linking the same pair in opposite directions cannot
//! deadlock. Reads take read locks one location at a time and never hold two.

use crate::location::{MemoryLocation, StoredRecord};
use crate::manager::MemoryManager;
use std::collections::BTreeSet;
use std::sync::Arc;
use tally_core::{
    Data, GraphData, MemoryReference, RelatedData, RelatedRecord, TallyError, TallyResult,
};
use tracing::debug;

/// Read/write/link operations over managed memory
///
/// Clone is cheap; clones share the same manager.
#[derive(Clone, Debug)]
pub struct MemoryOperations {
    manager: Arc<MemoryManager>,
}

impl MemoryOperations {
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self { manager }
    }

    /// The underlying manager
    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Store a record in a newly reserved location
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if no block has a free location.
    pub fn write(&self, record: StoredRecord) -> TallyResult<MemoryReference> {
        let (block, reference) = self.manager.allocate(&record.data.id)?;
        let stored = {
            let mut location = self.manager.location(reference)?.write();
            location.reserve(block).and_then(|_| location.store(record))
        };
        if let Err(e) = stored {
            self.manager.release(reference)?;
            return Err(e);
        }
        debug!(reference = %reference, block, "record written");
        Ok(reference)
    }

    /// Overwrite the record at `reference`, keeping its relationships
    ///
    /// Returns the previous record.
    ///
    /// # Errors
    ///
    /// `InvalidReference` if the location is not occupied.
    pub fn update(
        &self,
        reference: MemoryReference,
        record: StoredRecord,
    ) -> TallyResult<StoredRecord> {
        self.manager.location(reference)?.write().update(record)
    }

    /// Remove the record at `reference` and recycle the reference
    ///
    /// Relationships are cleared in both directions first. Freeing a location
    /// that holds nothing is a no-op returning `None`.
    pub fn free(&self, reference: MemoryReference) -> TallyResult<Option<StoredRecord>> {
        if !self.is_occupied(reference)? {
            return Ok(None);
        }
        self.delink_all(reference)?;
        self.dereference_all(reference)?;

        let removed = self.manager.location(reference)?.write().free();
        if removed.is_some() {
            self.manager.release(reference)?;
            debug!(reference = %reference, "record freed");
        }
        Ok(removed)
    }

    /// Payload at `reference`, if occupied
    pub fn read(&self, reference: MemoryReference) -> TallyResult<Option<Data>> {
        Ok(self.read_record(reference)?.map(|record| record.data))
    }

    /// Payload and sequence at `reference`, if occupied
    pub fn read_record(&self, reference: MemoryReference) -> TallyResult<Option<StoredRecord>> {
        let location = self.manager.location(reference)?.read();
        Ok(occupied_record(&location))
    }

    /// Record at `reference` with its links and references resolved
    pub fn read_graph(&self, reference: MemoryReference) -> TallyResult<Option<GraphData>> {
        let (record, links, references) = {
            let location = self.manager.location(reference)?.read();
            match occupied_record(&location) {
                Some(record) => (
                    record,
                    location.links().clone(),
                    location.references().clone(),
                ),
                None => return Ok(None),
            }
        };

        Ok(Some(GraphData {
            data: record.data,
            reference,
            sequence: record.sequence,
            related: RelatedData {
                links: self.resolve_all(&links)?,
                references: self.resolve_all(&references)?,
            },
        }))
    }

    /// Every occupied location in `start..=end`, ascending
    pub fn filter_by_range(
        &self,
        start: MemoryReference,
        end: MemoryReference,
    ) -> TallyResult<Vec<GraphData>> {
        if end < start {
            return Err(TallyError::invalid_reference(format!(
                "range end {} precedes start {}",
                end, start
            )));
        }
        let last = end.as_u64().min(self.manager.capacity().saturating_sub(1));
        let mut out = Vec::new();
        for id in start.as_u64()..=last {
            if let Some(graph) = self.read_graph(MemoryReference::new(id))? {
                out.push(graph);
            }
        }
        Ok(out)
    }

    /// Whether `reference` currently holds a record
    pub fn is_occupied(&self, reference: MemoryReference) -> TallyResult<bool> {
        Ok(self.manager.location(reference)?.read().is_occupied())
    }

    /// Number of occupied locations
    pub fn live_count(&self) -> u64 {
        self.manager.live()
    }

    /// Drop every record and relationship
    pub fn clear(&self) {
        self.manager.reset();
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Record that `source` points at `target`
    ///
    /// Returns false if the link already existed.
    ///
    /// # Errors
    ///
    /// `InvalidReference` unless both locations are occupied.
    pub fn link(&self, source: MemoryReference, target: MemoryReference) -> TallyResult<bool> {
        if source == target {
            let mut location = self.manager.location(source)?.write();
            if !location.is_occupied() {
                return Err(unoccupied_link(source, target));
            }
            let added = location.link(target);
            location.reference_from(source);
            return Ok(added);
        }

        self.with_pair(source, target, |src, dst| {
            if !src.is_occupied() || !dst.is_occupied() {
                return Err(unoccupied_link(source, target));
            }
            let added = src.link(target);
            dst.reference_from(source);
            Ok(added)
        })?
    }

    /// Link `source` to each target; returns how many links were new
    pub fn link_all(
        &self,
        source: MemoryReference,
        targets: &[MemoryReference],
    ) -> TallyResult<usize> {
        let mut added = 0;
        for &target in targets {
            if self.link(source, target)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove the link `source -> target`; false if it did not exist
    pub fn delink(&self, source: MemoryReference, target: MemoryReference) -> TallyResult<bool> {
        if source == target {
            let mut location = self.manager.location(source)?.write();
            location.dereference_from(source);
            return Ok(location.delink(target));
        }

        self.with_pair(source, target, |src, dst| {
            let removed = src.delink(target);
            dst.dereference_from(source);
            removed
        })
    }

    /// Remove the links from `source` to each target; returns how many existed
    pub fn delink_many(
        &self,
        source: MemoryReference,
        targets: &[MemoryReference],
    ) -> TallyResult<usize> {
        let mut removed = 0;
        for &target in targets {
            if self.delink(source, target)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every outgoing link of `source`; returns the former targets
    pub fn delink_all(&self, source: MemoryReference) -> TallyResult<Vec<MemoryReference>> {
        let targets: Vec<MemoryReference> = self
            .manager
            .location(source)?
            .read()
            .links()
            .iter()
            .copied()
            .collect();
        for &target in &targets {
            self.delink(source, target)?;
        }
        Ok(targets)
    }

    /// Remove every incoming reference to `target`; returns the former sources
    pub fn dereference_all(&self, target: MemoryReference) -> TallyResult<Vec<MemoryReference>> {
        let sources: Vec<MemoryReference> = self
            .manager
            .location(target)?
            .read()
            .references()
            .iter()
            .copied()
            .collect();
        for &source in &sources {
            self.delink(source, target)?;
        }
        Ok(sources)
    }

    /// Run `f` on the write-locked locations of two distinct references,
    /// lower reference locked first
    fn with_pair<R>(
        &self,
        a: MemoryReference,
        b: MemoryReference,
        f: impl FnOnce(&mut MemoryLocation, &mut MemoryLocation) -> R,
    ) -> TallyResult<R> {
        debug_assert_ne!(a, b);
        let la = self.manager.location(a)?;
        let lb = self.manager.location(b)?;

        if a < b {
            let mut ga = la.write();
            let mut gb = lb.write();
            Ok(f(&mut ga, &mut gb))
        } else {
            let mut gb = lb.write();
            let mut ga = la.write();
            Ok(f(&mut ga, &mut gb))
        }
    }

    fn resolve_all(
        &self,
        references: &BTreeSet<MemoryReference>,
    ) -> TallyResult<Vec<RelatedRecord>> {
        let mut out = Vec::with_capacity(references.len());
        for &reference in references {
            if let Some(record) = self.read_record(reference)? {
                out.push(RelatedRecord {
                    reference,
                    sequence: record.sequence,
                    data: record.data,
                });
            }
        }
        Ok(out)
    }
}

fn unoccupied_link(source: MemoryReference, target: MemoryReference) -> TallyError {
    TallyError::invalid_reference(format!(
        "cannot link {} -> {}: both locations must be occupied",
        source, target
    ))
}

fn occupied_record(location: &MemoryLocation) -> Option<StoredRecord> {
    if location.is_occupied() {
        location.record().cloned()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tally_core::Sequence;

    fn ops(capacity: u64, block_size: u64) -> MemoryOperations {
        MemoryOperations::new(Arc::new(MemoryManager::new(capacity, block_size).unwrap()))
    }

    fn record(id: &str, seq: u64) -> StoredRecord {
        StoredRecord::new(
            Data::new(id).with_body(json!({ "id": id })),
            Sequence::new(seq),
        )
    }

    #[test]
    fn test_write_then_read() {
        let ops = ops(16, 4);
        let data = Data::new("a").with_body(json!({"v": 1}));
        let r = ops
            .write(StoredRecord::new(data.clone(), Sequence::new(1)))
            .unwrap();
        assert_eq!(ops.read(r).unwrap(), Some(data));
        assert_eq!(ops.live_count(), 1);
    }

    #[test]
    fn test_free_then_read_is_absent() {
        let ops = ops(16, 4);
        let r = ops.write(record("a", 1)).unwrap();
        assert!(ops.free(r).unwrap().is_some());
        assert_eq!(ops.read(r).unwrap(), None);
        assert!(ops.read_graph(r).unwrap().is_none());
        assert_eq!(ops.live_count(), 0);
    }

    #[test]
    fn test_free_is_noop_when_empty() {
        let ops = ops(16, 4);
        assert!(ops.free(MemoryReference::new(3)).unwrap().is_none());
        let r = ops.write(record("a", 1)).unwrap();
        ops.free(r).unwrap();
        assert!(ops.free(r).unwrap().is_none());
    }

    #[test]
    fn test_update_in_place() {
        let ops = ops(16, 4);
        let r = ops.write(record("a", 1)).unwrap();
        let old = ops.update(r, record("a", 2)).unwrap();
        assert_eq!(old.sequence, Sequence::new(1));
        assert_eq!(ops.read_record(r).unwrap().unwrap().sequence, Sequence::new(2));
    }

    #[test]
    fn test_update_unoccupied_fails() {
        let ops = ops(16, 4);
        let err = ops
            .update(MemoryReference::new(2), record("a", 1))
            .unwrap_err();
        assert!(matches!(err, TallyError::InvalidReference { .. }));
    }

    #[test]
    fn test_capacity_exceeded() {
        let ops = ops(2, 1);
        ops.write(record("a", 1)).unwrap();
        ops.write(record("b", 2)).unwrap();
        let err = ops.write(record("c", 3)).unwrap_err();
        assert!(matches!(err, TallyError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_freed_reference_is_reused() {
        let ops = ops(1, 1);
        let r = ops.write(record("a", 1)).unwrap();
        ops.free(r).unwrap();
        let again = ops.write(record("b", 2)).unwrap();
        assert_eq!(r, again);
        assert_eq!(ops.read(again).unwrap().unwrap().id, "b");
    }

    #[test]
    fn test_out_of_range_reference() {
        let ops = ops(4, 2);
        assert!(ops.read(MemoryReference::new(4)).is_err());
    }

    #[test]
    fn test_link_is_directional() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let b = ops.write(record("b", 2)).unwrap();
        ops.link(a, b).unwrap();

        let ga = ops.read_graph(a).unwrap().unwrap();
        assert_eq!(ga.related.link_refs(), vec![b]);
        assert!(ga.related.references.is_empty());

        let gb = ops.read_graph(b).unwrap().unwrap();
        assert!(gb.related.links.is_empty());
        assert_eq!(gb.related.reference_refs(), vec![a]);
        assert_eq!(gb.related.references[0].data.id, "a");
    }

    #[test]
    fn test_link_is_idempotent() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let b = ops.write(record("b", 2)).unwrap();
        assert!(ops.link(a, b).unwrap());
        let once = ops.read_graph(a).unwrap().unwrap().related;
        assert!(!ops.link(a, b).unwrap());
        let twice = ops.read_graph(a).unwrap().unwrap().related;
        assert_eq!(once, twice);
        assert_eq!(ops.read_graph(b).unwrap().unwrap().related.references.len(), 1);
    }

    #[test]
    fn test_link_requires_occupied() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let empty = (0..16)
            .map(MemoryReference::new)
            .find(|r| *r != a)
            .unwrap();
        assert!(ops.link(a, empty).is_err());
        assert!(ops.link(empty, a).is_err());
    }

    #[test]
    fn test_self_link() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        assert!(ops.link(a, a).unwrap());
        let g = ops.read_graph(a).unwrap().unwrap();
        assert_eq!(g.related.link_refs(), vec![a]);
        assert_eq!(g.related.reference_refs(), vec![a]);

        assert!(ops.delink(a, a).unwrap());
        assert!(ops.read_graph(a).unwrap().unwrap().related.is_empty());
    }

    #[test]
    fn test_bulk_link_and_delink() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let b = ops.write(record("b", 2)).unwrap();
        let c = ops.write(record("c", 3)).unwrap();

        assert_eq!(ops.link_all(a, &[b, c, b]).unwrap(), 2);
        assert_eq!(ops.delink_many(a, &[b, b]).unwrap(), 1);
        assert_eq!(ops.read_graph(a).unwrap().unwrap().related.link_refs(), vec![c]);
    }

    #[test]
    fn test_delink_all_and_dereference_all_clear_both_sides() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let b = ops.write(record("b", 2)).unwrap();
        let c = ops.write(record("c", 3)).unwrap();
        ops.link_all(a, &[b, c]).unwrap();
        ops.link(c, a).unwrap();

        let mut removed = ops.delink_all(a).unwrap();
        removed.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(ops.read_graph(b).unwrap().unwrap().related.references.is_empty());

        assert_eq!(ops.dereference_all(a).unwrap(), vec![c]);
        assert!(ops.read_graph(c).unwrap().unwrap().related.links.is_empty());
        assert!(ops.read_graph(a).unwrap().unwrap().related.is_empty());
    }

    #[test]
    fn test_free_removes_neighbors_view() {
        let ops = ops(16, 4);
        let a = ops.write(record("a", 1)).unwrap();
        let b = ops.write(record("b", 2)).unwrap();
        ops.link(a, b).unwrap();
        ops.link(b, a).unwrap();
        ops.free(b).unwrap();
        assert!(ops.read_graph(a).unwrap().unwrap().related.is_empty());
    }

    #[test]
    fn test_filter_by_range() {
        let ops = ops(8, 8);
        let refs: Vec<_> = (0..4)
            .map(|i| ops.write(record(&format!("r{}", i), i + 1)).unwrap())
            .collect();
        ops.free(refs[1]).unwrap();

        let all = ops
            .filter_by_range(MemoryReference::new(0), MemoryReference::new(100))
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].reference < w[1].reference));
        assert!(ops
            .filter_by_range(MemoryReference::new(5), MemoryReference::new(1))
            .is_err());
    }

    #[test]
    fn test_concurrent_opposite_links_do_not_deadlock() {
        let ops = ops(64, 16);
        let refs: Vec<_> = (0..8)
            .map(|i| ops.write(record(&format!("n{}", i), i + 1)).unwrap())
            .collect();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ops = ops.clone();
                let refs = refs.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        for i in 0..refs.len() {
                            let j = (i + 1 + t) % refs.len();
                            if t % 2 == 0 {
                                ops.link(refs[i], refs[j]).unwrap();
                            } else {
                                ops.link(refs[j], refs[i]).unwrap();
                                ops.delink(refs[j], refs[i]).unwrap();
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for &r in &refs {
            let g = ops.read_graph(r).unwrap().unwrap();
            for link in g.related.link_refs() {
                let target = ops.read_graph(link).unwrap().unwrap();
                assert!(target.related.reference_refs().contains(&r));
            }
        }
    }
}
