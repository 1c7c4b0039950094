//! Applying decisions to memory
//!
//! [`Records`] ties memory operations, the identity index and the matchmaker
//! together so that a decision is applied the same way whether it was just
//! issued or is being replayed from the log.

use crate::matchmaker::Matchmaker;
use std::sync::Arc;
use tally_core::{
    Data, Decision, GraphData, MemoryReference, RequestType, Sequence, TallyError, TallyResult,
};
use tally_storage::{IdentityIndex, MemoryManager, MemoryOperations, StoredRecord};
use tracing::debug;

/// Outcome of applying one decision
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Location the decision wrote, updated or freed
    pub reference: MemoryReference,
    /// The record before the decision
    pub old: Option<GraphData>,
    /// The record after the decision
    pub new: Option<GraphData>,
}

/// In-memory record state
#[derive(Debug)]
pub struct Records {
    ops: MemoryOperations,
    index: Arc<IdentityIndex>,
    matchmaker: Matchmaker,
}

impl Records {
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        let ops = MemoryOperations::new(manager);
        let index = Arc::new(IdentityIndex::new());
        let matchmaker = Matchmaker::new(ops.clone(), Arc::clone(&index));
        Self {
            ops,
            index,
            matchmaker,
        }
    }

    pub fn ops(&self) -> &MemoryOperations {
        &self.ops
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Reject a request that cannot apply to the current state
    ///
    /// Run before a sequence is issued so that ordinary mistakes do not
    /// consume one.
    pub fn check(&self, request_type: Option<RequestType>, data: &Data) -> TallyResult<()> {
        match request_type {
            Some(RequestType::Create) if self.index.contains(&data.id) => Err(
                TallyError::invalid_input(format!("record {:?} already exists", data.id)),
            ),
            Some(RequestType::Update) | Some(RequestType::Delete) => {
                self.reference_of(&data.id).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Apply a decision by its request type
    pub fn apply(&self, decision: &Decision) -> TallyResult<Applied> {
        let applied = match decision.request_type() {
            RequestType::Create => self.create(decision.payload(), decision.sequence()),
            RequestType::Update => self.update(decision.payload(), decision.sequence()),
            RequestType::Delete => self.delete(decision.payload()),
            RequestType::Read => Err(TallyError::unsupported_request(Some(RequestType::Read))),
        }?;
        debug!(
            sequence = %decision.sequence(),
            request_type = %decision.request_type(),
            reference = %applied.reference,
            "decision applied"
        );
        Ok(applied)
    }

    /// Store a new record and connect it to its neighbors
    pub fn create(&self, data: &Data, sequence: Sequence) -> TallyResult<Applied> {
        if self.index.contains(&data.id) {
            return Err(TallyError::invalid_input(format!(
                "record {:?} already exists",
                data.id
            )));
        }

        let reference = self
            .ops
            .write(StoredRecord::new(data.clone(), sequence))?;
        self.index.insert(&data.id, sequence, reference);

        let linked = self
            .matchmaker
            .match_record(reference, data)
            .and_then(|_| self.matchmaker.bachelor(&data.id, reference));
        if let Err(e) = linked {
            self.matchmaker.separate(reference, data)?;
            self.ops.free(reference)?;
            self.index.remove(&data.id);
            return Err(e);
        }

        Ok(Applied {
            reference,
            old: None,
            new: self.ops.read_graph(reference)?,
        })
    }

    /// Overwrite a record, relinking if its declared relations changed
    pub fn update(&self, data: &Data, sequence: Sequence) -> TallyResult<Applied> {
        let reference = self.reference_of(&data.id)?;
        let old = self.ops.read_graph(reference)?;

        let previous = self
            .ops
            .update(reference, StoredRecord::new(data.clone(), sequence))?;
        self.index.resequence(&data.id, sequence);
        if !previous.data.same_relations(data) {
            self.matchmaker.revow(reference, &previous.data, data)?;
        }

        Ok(Applied {
            reference,
            old,
            new: self.ops.read_graph(reference)?,
        })
    }

    /// Remove a record and every relationship it takes part in
    pub fn delete(&self, data: &Data) -> TallyResult<Applied> {
        let reference = self.reference_of(&data.id)?;
        let old = self.ops.read_graph(reference)?;
        let stored = old.as_ref().map(|g| &g.data).unwrap_or(data);

        self.matchmaker.separate(reference, stored)?;
        self.ops.free(reference)?;
        self.index.remove(&data.id);

        Ok(Applied {
            reference,
            old,
            new: None,
        })
    }

    /// Record with external id `id`
    pub fn read_by_id(&self, id: &str) -> TallyResult<Option<GraphData>> {
        match self.index.reference_of(id) {
            Some(reference) => self.ops.read_graph(reference),
            None => Ok(None),
        }
    }

    /// Record last written by `sequence`
    pub fn read_by_sequence(&self, sequence: Sequence) -> TallyResult<Option<GraphData>> {
        match self.index.reference_at(sequence) {
            Some(reference) => self.ops.read_graph(reference),
            None => Ok(None),
        }
    }

    /// Live records whose last write falls in `start..=end`, ascending by sequence
    pub fn filter_by_sequence(
        &self,
        start: Sequence,
        end: Sequence,
    ) -> TallyResult<Vec<GraphData>> {
        if end < start {
            return Err(TallyError::invalid_reference(format!(
                "sequence range end {} precedes start {}",
                end, start
            )));
        }
        let mut out = Vec::new();
        for (_, reference) in self.index.sequences_in(start, end) {
            if let Some(graph) = self.ops.read_graph(reference)? {
                out.push(graph);
            }
        }
        Ok(out)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop every record, relation and parked relation
    pub fn clear(&self) {
        self.matchmaker.clear();
        self.index.clear();
        self.ops.clear();
    }

    fn reference_of(&self, id: &str) -> TallyResult<MemoryReference> {
        self.index
            .reference_of(id)
            .ok_or_else(|| TallyError::invalid_reference(format!("no record with id {:?}", id)))
    }
}
