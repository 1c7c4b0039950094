//! Memory blocks
//!
//! A block owns a contiguous range `[start, end)` of references. It hands
//! references out from a forward cursor and takes them back into a recycle
//! set; recycled references are reissued lowest-first before the cursor
//! advances.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use tally_core::{MemoryReference, TallyError, TallyResult};

#[derive(Debug)]
struct BlockState {
    start: u64,
    end: u64,
    /// Next never-issued reference; `[start, next)` has been issued at least once
    next: u64,
    recycled: BTreeSet<u64>,
    live: u64,
}

impl BlockState {
    fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            next: start,
            recycled: BTreeSet::new(),
            live: 0,
        }
    }

    fn is_live(&self, id: u64) -> bool {
        id >= self.start && id < self.next && !self.recycled.contains(&id)
    }
}

/// Contiguous sub-range of the reference space
pub struct MemoryBlock {
    index: usize,
    state: Mutex<BlockState>,
}

impl MemoryBlock {
    /// Create a block covering `[start, end)`
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self {
            index,
            state: Mutex::new(BlockState::new(start, end)),
        }
    }

    /// Position of this block in the resolver
    pub fn index(&self) -> usize {
        self.index
    }

    /// First reference in the block
    pub fn start(&self) -> u64 {
        self.state.lock().start
    }

    /// One past the last reference in the block
    pub fn end(&self) -> u64 {
        self.state.lock().end
    }

    /// Number of references the block covers
    pub fn len(&self) -> u64 {
        let state = self.state.lock();
        state.end - state.start
    }

    /// True for a zero-width block
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// References currently issued and not recycled
    pub fn live(&self) -> u64 {
        self.state.lock().live
    }

    /// References that can still be reserved
    pub fn available(&self) -> u64 {
        let state = self.state.lock();
        (state.end - state.next) + state.recycled.len() as u64
    }

    /// Whether `reference` falls inside this block's range
    pub fn contains(&self, reference: MemoryReference) -> bool {
        let state = self.state.lock();
        let id = reference.as_u64();
        id >= state.start && id < state.end
    }

    /// Issue the next free reference, lowest recycled first
    pub fn reserve(&self) -> Option<MemoryReference> {
        let mut state = self.state.lock();
        let id = if let Some(id) = state.recycled.pop_first() {
            id
        } else if state.next < state.end {
            let id = state.next;
            state.next += 1;
            id
        } else {
            return None;
        };
        state.live += 1;
        Some(MemoryReference::new(id))
    }

    /// Return a reference to the pool
    ///
    /// Returns false if the reference is outside the block, was never issued,
    /// or is already recyclable.
    pub fn recycle(&self, reference: MemoryReference) -> bool {
        let mut state = self.state.lock();
        let id = reference.as_u64();
        if !state.is_live(id) {
            return false;
        }
        state.recycled.insert(id);
        state.live -= 1;
        true
    }

    /// Move the block's boundaries
    ///
    /// Every live reference must stay inside the new range. References that
    /// become part of the block below the old start are immediately
    /// reservable; recyclable references that fall outside are dropped.
    /// Neighbouring blocks are not consulted; go through
    /// [`BlockResolver::move_boundary`](crate::resolver::BlockResolver::move_boundary).
    pub(crate) fn set_boundaries(&self, start: u64, end: u64) -> TallyResult<()> {
        if end < start {
            return Err(TallyError::invalid_reference(format!(
                "block {} boundary end {} precedes start {}",
                self.index, end, start
            )));
        }

        let mut state = self.state.lock();
        if let Some(stranded) = (state.start..state.next)
            .find(|&id| (id < start || id >= end) && state.is_live(id))
        {
            return Err(TallyError::invalid_reference(format!(
                "block {} cannot move boundaries to [{}, {}): reference {} is live",
                self.index, start, end, stranded
            )));
        }

        let old_start = state.start;
        state.recycled.retain(|&id| id >= start && id < end);
        if start < old_start {
            let grown = start..old_start.min(end);
            state.recycled.extend(grown);
        }
        state.next = state.next.clamp(start.max(old_start.min(end)), end);
        state.start = start;
        state.end = end;
        Ok(())
    }

    /// Forget every issued reference
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let (start, end) = (state.start, state.end);
        *state = BlockState::new(start, end);
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBlock")
            .field("index", &self.index)
            .field("start", &state.start)
            .field("end", &state.end)
            .field("live", &state.live)
            .finish()
    }
}

impl fmt::Display for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "block {} [{}, {}) live {}",
            self.index, state.start, state.end, state.live
        )
    }
}
