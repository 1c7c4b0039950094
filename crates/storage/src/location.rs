//! Storage locations
//!
//! One `MemoryLocation` exists per reference. It moves through
//! `Empty → Reserved → Occupied → Freed`, and a freed location is reserved
//! again once its reference is reissued.
//!
//! Locations hold only their own side of a relationship. Keeping the
//! outgoing `links` of one location and the incoming `references` of the
//! other in step is the job of [`crate::operations::MemoryOperations`].

use std::collections::BTreeSet;
use tally_core::{Data, MemoryReference, Sequence, TallyError, TallyResult};

/// Lifecycle state of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationState {
    /// Never used
    Empty,
    /// Bound to a block, no record yet
    Reserved,
    /// Holding a record
    Occupied,
    /// Record removed; reference recyclable
    Freed,
}

/// Record held by a location
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Payload
    pub data: Data,
    /// Sequence of the decision that wrote it
    pub sequence: Sequence,
}

impl StoredRecord {
    /// Pair a payload with the sequence that wrote it
    pub fn new(data: Data, sequence: Sequence) -> Self {
        Self { data, sequence }
    }
}

/// Mutable slot addressed by one reference
#[derive(Debug)]
pub struct MemoryLocation {
    reference: MemoryReference,
    state: LocationState,
    block: Option<usize>,
    record: Option<StoredRecord>,
    links: BTreeSet<MemoryReference>,
    references: BTreeSet<MemoryReference>,
}

impl MemoryLocation {
    /// Create an empty location for `reference`
    pub fn new(reference: MemoryReference) -> Self {
        Self {
            reference,
            state: LocationState::Empty,
            block: None,
            record: None,
            links: BTreeSet::new(),
            references: BTreeSet::new(),
        }
    }

    pub fn reference(&self) -> MemoryReference {
        self.reference
    }

    pub fn state(&self) -> LocationState {
        self.state
    }

    /// Block the location was last reserved in
    pub fn block(&self) -> Option<usize> {
        self.block
    }

    pub fn record(&self) -> Option<&StoredRecord> {
        self.record.as_ref()
    }

    pub fn is_occupied(&self) -> bool {
        self.state == LocationState::Occupied
    }

    /// Outgoing links, ascending
    pub fn links(&self) -> &BTreeSet<MemoryReference> {
        &self.links
    }

    /// Incoming references, ascending
    pub fn references(&self) -> &BTreeSet<MemoryReference> {
        &self.references
    }

    /// Bind the location to a block ahead of storing a record
    pub fn reserve(&mut self, block: usize) -> TallyResult<()> {
        match self.state {
            LocationState::Empty | LocationState::Freed => {
                self.state = LocationState::Reserved;
                self.block = Some(block);
                Ok(())
            }
            state => Err(self.wrong_state("reserve", state)),
        }
    }

    /// Store the first record in a reserved location
    pub fn store(&mut self, record: StoredRecord) -> TallyResult<()> {
        match self.state {
            LocationState::Reserved => {
                self.record = Some(record);
                self.state = LocationState::Occupied;
                Ok(())
            }
            state => Err(self.wrong_state("store into", state)),
        }
    }

    /// Overwrite the record in place, keeping links and references
    ///
    /// Returns the previous record.
    pub fn update(&mut self, record: StoredRecord) -> TallyResult<StoredRecord> {
        match (self.state, self.record.take()) {
            (LocationState::Occupied, Some(old)) => {
                self.record = Some(record);
                Ok(old)
            }
            (state, previous) => {
                self.record = previous;
                Err(self.wrong_state("update", state))
            }
        }
    }

    /// Clear record, links and references
    ///
    /// Returns the removed record, or `None` if the location held none, in
    /// which case nothing changes.
    pub fn free(&mut self) -> Option<StoredRecord> {
        match self.state {
            LocationState::Reserved | LocationState::Occupied => {
                self.state = LocationState::Freed;
                self.links.clear();
                self.references.clear();
                self.record.take()
            }
            LocationState::Empty | LocationState::Freed => None,
        }
    }

    /// Add an outgoing link; false if it already existed
    pub fn link(&mut self, target: MemoryReference) -> bool {
        self.links.insert(target)
    }

    /// Remove an outgoing link; false if it did not exist
    pub fn delink(&mut self, target: MemoryReference) -> bool {
        self.links.remove(&target)
    }

    /// Record that `source` points here; false if already recorded
    pub fn reference_from(&mut self, source: MemoryReference) -> bool {
        self.references.insert(source)
    }

    /// Forget that `source` points here; false if it was not recorded
    pub fn dereference_from(&mut self, source: MemoryReference) -> bool {
        self.references.remove(&source)
    }

    /// Back to the never-used state
    pub fn reset(&mut self) {
        *self = MemoryLocation::new(self.reference);
    }

    fn wrong_state(&self, action: &str, state: LocationState) -> TallyError {
        TallyError::invalid_reference(format!(
            "cannot {} location {} in state {:?}",
            action, self.reference, state
        ))
    }
}
