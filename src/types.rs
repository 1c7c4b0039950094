//! Public types for the TallyDB API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// ============================================================================
// Records and relationships
// ============================================================================

pub use tally_core::{Data, GraphData, Permissions, RelatedData, RelatedRecord};

// ============================================================================
// Ordering
// ============================================================================

pub use tally_concurrency::RequestContext;
pub use tally_core::{Decision, MemoryReference, RequestType, Sequence};

// ============================================================================
// Configuration and errors
// ============================================================================

pub use tally_core::{RecoveryMode, TallyConfig, TallyError, TallyResult};

// Flush observability
pub use tally_durability::DurabilityCounters;
