//! Memory manager
//!
//! Owns the location array, the block resolver and the canonical reference
//! table. Locations are allocated up front, one per reference, each behind
//! its own `RwLock`, so a mutation on one reference never blocks readers of
//! another.

use crate::block::MemoryBlock;
use crate::location::MemoryLocation;
use crate::resolver::BlockResolver;
use parking_lot::RwLock;
use std::sync::Arc;
use tally_core::{InternTable, MemoryReference, TallyConfig, TallyError, TallyResult};

/// Owner of every storage location
pub struct MemoryManager {
    resolver: BlockResolver,
    locations: Vec<RwLock<MemoryLocation>>,
    references: InternTable<MemoryReference>,
}

impl MemoryManager {
    /// Create a manager with `capacity` locations in blocks of `block_size`
    pub fn new(capacity: u64, block_size: u64) -> TallyResult<Self> {
        let resolver = BlockResolver::new(capacity, block_size)?;
        let locations = (0..capacity)
            .map(|id| RwLock::new(MemoryLocation::new(MemoryReference::new(id))))
            .collect();
        Ok(Self {
            resolver,
            locations,
            references: InternTable::new(),
        })
    }

    /// Create a manager sized by `config`
    pub fn from_config(config: &TallyConfig) -> TallyResult<Self> {
        config.validate()?;
        Self::new(config.capacity, config.block_size)
    }

    /// Total number of locations
    pub fn capacity(&self) -> u64 {
        self.resolver.capacity()
    }

    /// All blocks, ascending
    pub fn blocks(&self) -> &[MemoryBlock] {
        self.resolver.blocks()
    }

    /// The block resolver
    pub fn resolver(&self) -> &BlockResolver {
        &self.resolver
    }

    /// Block owning `reference`
    pub fn block_of(&self, reference: MemoryReference) -> TallyResult<&MemoryBlock> {
        self.resolver.block_of(reference)
    }

    /// Canonical reference for `id`
    ///
    /// # Errors
    ///
    /// `InvalidReference` for a negative id or one beyond capacity.
    pub fn reference(&self, id: i64) -> TallyResult<Arc<MemoryReference>> {
        self.within_capacity(id)?;
        self.references.value_of(id)
    }

    /// Canonical references for `start..=end`
    pub fn reference_range(&self, start: i64, end: i64) -> TallyResult<Vec<Arc<MemoryReference>>> {
        self.within_capacity(end)?;
        self.references.range_of(start, end)
    }

    /// The canonical reference table
    pub fn references(&self) -> &InternTable<MemoryReference> {
        &self.references
    }

    /// Location addressed by `reference`
    ///
    /// # Errors
    ///
    /// `InvalidReference` if the reference is beyond capacity.
    pub fn location(&self, reference: MemoryReference) -> TallyResult<&RwLock<MemoryLocation>> {
        self.locations.get(reference.index()).ok_or_else(|| {
            TallyError::invalid_reference(format!(
                "reference {} is beyond capacity {}",
                reference,
                self.capacity()
            ))
        })
    }

    /// Reserve a reference for a record, returning it with its block index
    pub(crate) fn allocate(&self, data_id: &str) -> TallyResult<(usize, MemoryReference)> {
        let (block, reference) = self.resolver.allocate(data_id)?;
        self.references.canonical(reference.as_u64());
        Ok((block, reference))
    }

    /// Make `reference` reissuable in its owning block
    pub(crate) fn release(&self, reference: MemoryReference) -> TallyResult<bool> {
        Ok(self.block_of(reference)?.recycle(reference))
    }

    fn within_capacity(&self, id: i64) -> TallyResult<()> {
        match u64::try_from(id) {
            Ok(id) if id >= self.capacity() => Err(TallyError::invalid_reference(format!(
                "reference {} is beyond capacity {}",
                id,
                self.capacity()
            ))),
            _ => Ok(()),
        }
    }

    /// References issued and not recycled
    pub fn live(&self) -> u64 {
        self.resolver.live()
    }

    /// Return every location, block and canonical reference to a fresh state
    pub fn reset(&self) {
        for location in &self.locations {
            location.write().reset();
        }
        self.resolver.clear();
        self.references.reset();
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("capacity", &self.capacity())
            .field("blocks", &self.resolver.block_count())
            .field("live", &self.live())
            .finish()
    }
}
