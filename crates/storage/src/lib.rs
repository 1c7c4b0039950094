//! Managed memory for Tally
//!
//! Partitions a fixed reference space into blocks, owns one storage location
//! per reference, and links locations to one another.
//!
//! - `block`: contiguous reference ranges with recycling
//! - `resolver`: partition and deterministic write routing
//! - `location`: per-reference slot state machine
//! - `manager`: location array and canonical reference table
//! - `operations`: read/write/update/free and link/delink facade
//! - `mappings`: record id / sequence → reference index

#![warn(clippy::all)]

pub mod block;
pub mod location;
pub mod manager;
pub mod mappings;
pub mod operations;
pub mod resolver;

pub use block::MemoryBlock;
pub use location::{LocationState, MemoryLocation, StoredRecord};
pub use manager::MemoryManager;
pub use mappings::IdentityIndex;
pub use operations::MemoryOperations;
pub use resolver::BlockResolver;
