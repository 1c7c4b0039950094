//! Block resolution
//!
//! Partitions `[0, capacity)` into fixed-size blocks (the last block absorbs
//! any remainder) and routes writes to them.
//!
//! # Routing
//!
//! A record's home block is `fxhash(data_id) % block_count`. FxHash is
//! unseeded, so the home block of an id is the same on every call and in
//! every process. When the home block is full the next blocks are probed in
//! ascending order (wrapping), which is equally deterministic.
//!
//! # Resizing
//!
//! Boundaries only move in pairs: [`BlockResolver::move_boundary`] hands a
//! range from one block to its neighbour, so the blocks keep covering
//! `[0, capacity)` with no gaps or overlaps. `block_of` searches the current
//! block starts rather than assuming fixed-size blocks.

use crate::block::MemoryBlock;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tally_core::{MemoryReference, TallyConfig, TallyError, TallyResult};
use tracing::debug;

/// Partition of the reference space into blocks
#[derive(Debug)]
pub struct BlockResolver {
    blocks: Vec<MemoryBlock>,
    block_size: u64,
    capacity: u64,
    resize_lock: Mutex<()>,
}

impl BlockResolver {
    /// Partition `capacity` references into blocks of `block_size`
    pub fn new(capacity: u64, block_size: u64) -> TallyResult<Self> {
        if block_size == 0 || capacity < block_size {
            return Err(TallyError::invalid_input(format!(
                "cannot partition capacity {} into blocks of {}",
                capacity, block_size
            )));
        }

        let count = capacity / block_size;
        let blocks = (0..count)
            .map(|i| {
                let start = i * block_size;
                let end = if i + 1 == count {
                    capacity
                } else {
                    start + block_size
                };
                MemoryBlock::new(i as usize, start, end)
            })
            .collect();

        Ok(Self {
            blocks,
            block_size,
            capacity,
            resize_lock: Mutex::new(()),
        })
    }

    /// Build from a validated configuration
    pub fn from_config(config: &TallyConfig) -> TallyResult<Self> {
        Self::new(config.capacity, config.block_size)
    }

    /// All blocks, ascending
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of references
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Nominal references per block
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// The block a record id is routed to when it has room
    pub fn home_block(&self, data_id: &str) -> usize {
        let mut hasher = FxHasher::default();
        data_id.hash(&mut hasher);
        (hasher.finish() % self.blocks.len() as u64) as usize
    }

    /// The block that should serve a write of `data_id`
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if every block is full.
    pub fn resolve(&self, data_id: &str) -> TallyResult<&MemoryBlock> {
        self.probe(data_id)
            .find(|block| block.available() > 0)
            .ok_or_else(|| self.exhausted())
    }

    /// Reserve a reference for `data_id` in the first block with room
    pub fn allocate(&self, data_id: &str) -> TallyResult<(usize, MemoryReference)> {
        self.probe(data_id)
            .find_map(|block| block.reserve().map(|r| (block.index(), r)))
            .ok_or_else(|| self.exhausted())
    }

    /// The block owning `reference`
    ///
    /// # Errors
    ///
    /// `InvalidReference` if the reference is beyond capacity.
    pub fn block_of(&self, reference: MemoryReference) -> TallyResult<&MemoryBlock> {
        let id = reference.as_u64();
        if id >= self.capacity {
            return Err(TallyError::invalid_reference(format!(
                "reference {} is beyond capacity {}",
                reference, self.capacity
            )));
        }
        let index = self
            .blocks
            .partition_point(|block| block.start() <= id)
            .saturating_sub(1);
        Ok(&self.blocks[index])
    }

    /// Move the boundary between block `index - 1` and block `index` to `at`
    ///
    /// The block giving up references is shrunk before its neighbour grows,
    /// so no reference is ever reservable from both.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `index` is 0 or out of range
    /// - `InvalidReference` if `at` lies outside the two blocks, or a live
    ///   reference would change owner
    pub fn move_boundary(&self, index: usize, at: u64) -> TallyResult<()> {
        let _guard = self.resize_lock.lock();
        let (lower, upper) = match (index.checked_sub(1), self.blocks.get(index)) {
            (Some(below), Some(upper)) => (&self.blocks[below], upper),
            _ => {
                return Err(TallyError::invalid_input(format!(
                    "no boundary below block {}",
                    index
                )))
            }
        };

        let (low_start, up_end) = (lower.start(), upper.end());
        if at < low_start || at > up_end {
            return Err(TallyError::invalid_reference(format!(
                "boundary {} is outside [{}, {}]",
                at, low_start, up_end
            )));
        }

        let current = upper.start();
        if at > current {
            upper.set_boundaries(at, up_end)?;
            lower.set_boundaries(low_start, at)?;
        } else if at < current {
            lower.set_boundaries(low_start, at)?;
            upper.set_boundaries(at, up_end)?;
        }
        debug!(index, from = current, to = at, "block boundary moved");
        Ok(())
    }

    /// References issued and not recycled, across all blocks
    pub fn live(&self) -> u64 {
        self.blocks.iter().map(MemoryBlock::live).sum()
    }

    /// Forget every issued reference in every block
    pub fn clear(&self) {
        for block in &self.blocks {
            block.clear();
        }
    }

    fn probe<'a>(&'a self, data_id: &str) -> impl Iterator<Item = &'a MemoryBlock> + 'a {
        let home = self.home_block(data_id);
        let n = self.blocks.len();
        (0..n).map(move |offset| &self.blocks[(home + offset) % n])
    }

    fn exhausted(&self) -> TallyError {
        TallyError::capacity_exceeded("memory block", self.capacity, self.live() + 1)
    }
}
