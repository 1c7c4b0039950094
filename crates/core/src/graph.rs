//! Records enriched with their storage identity and relationships.

use crate::data::Data;
use crate::types::{MemoryReference, Sequence};
use std::fmt;

/// A neighbor of a record, as seen from the record.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRecord {
    /// Where the neighbor lives.
    pub reference: MemoryReference,
    /// Sequence of the decision that last wrote the neighbor.
    pub sequence: Sequence,
    /// The neighbor's payload.
    pub data: Data,
}

/// Relationship bundle of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedData {
    /// Records this one points at (outgoing), ascending by reference.
    pub links: Vec<RelatedRecord>,
    /// Records pointing at this one (incoming), ascending by reference.
    pub references: Vec<RelatedRecord>,
}

impl RelatedData {
    /// True when the record has no neighbors in either direction.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.references.is_empty()
    }

    /// References of the outgoing links.
    pub fn link_refs(&self) -> Vec<MemoryReference> {
        self.links.iter().map(|r| r.reference).collect()
    }

    /// References of the incoming references.
    pub fn reference_refs(&self) -> Vec<MemoryReference> {
        self.references.iter().map(|r| r.reference).collect()
    }
}

/// A record together with its reference, sequence and relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphData {
    /// The payload.
    pub data: Data,
    /// Slot holding the record.
    pub reference: MemoryReference,
    /// Sequence of the decision that last wrote the record.
    pub sequence: Sequence,
    /// Outgoing links and incoming references.
    pub related: RelatedData,
}

impl GraphData {
    /// External id of the record.
    pub fn id(&self) -> &str {
        &self.data.id
    }
}

impl fmt::Display for GraphData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GraphData {{ id: {}, reference: {}, sequence: {}, links: {}, references: {} }}",
            self.data.id,
            self.reference,
            self.sequence,
            self.related.links.len(),
            self.related.references.len()
        )
    }
}
