//! Identity value types
//!
//! `MemoryReference` and `Sequence` are plain numeric handles. Canonical
//! shared instances are handed out by [`crate::intern::InternTable`]; the
//! values themselves are `Copy` so the hot paths never touch the table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A numeric identity that can be canonicalized by an intern table
pub trait Identity: Copy + Eq + Ord + Send + Sync + 'static {
    /// Short name used in error messages
    const KIND: &'static str;

    /// Build the value for a validated, non-negative id
    fn from_id(id: u64) -> Self;

    /// The numeric id
    fn id(&self) -> u64;
}

/// Handle identifying one storage slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryReference(u64);

impl MemoryReference {
    /// Create a reference from its numeric id
    #[inline]
    pub const fn new(id: u64) -> Self {
        MemoryReference(id)
    }

    /// Numeric id of this reference
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Position of this reference in a location array
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Identity for MemoryReference {
    const KIND: &'static str = "memory reference";

    fn from_id(id: u64) -> Self {
        MemoryReference(id)
    }

    fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Total-order position of a decision
///
/// `Sequence::ZERO` means "no decisions yet"; the first decision is 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// Sentinel for an empty decision log
    pub const ZERO: Sequence = Sequence(0);

    /// Create a sequence from its numeric value
    #[inline]
    pub const fn new(value: u64) -> Self {
        Sequence(value)
    }

    /// Numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The sequence immediately after this one
    #[inline]
    pub const fn next(&self) -> Sequence {
        Sequence(self.0 + 1)
    }

    /// True for the "no decisions yet" sentinel
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Identity for Sequence {
    const KIND: &'static str = "sequence";

    fn from_id(id: u64) -> Self {
        Sequence(id)
    }

    fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of request handed to the decision maker
///
/// `Read` exists so collaborators can describe every request they see, but it
/// is never a valid decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    /// Insert a new record
    Create,
    /// Read a record (never logged)
    Read,
    /// Overwrite an existing record
    Update,
    /// Remove an existing record
    Delete,
}

impl RequestType {
    /// Canonical upper-case name, as stored in the persistence row
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "CREATE",
            RequestType::Read => "READ",
            RequestType::Update => "UPDATE",
            RequestType::Delete => "DELETE",
        }
    }

    /// True for the types that mutate state and may become decisions
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, RequestType::Read)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = crate::TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(RequestType::Create),
            "READ" => Ok(RequestType::Read),
            "UPDATE" => Ok(RequestType::Update),
            "DELETE" => Ok(RequestType::Delete),
            other => Err(crate::TallyError::serialization(format!(
                "unknown request type '{}'",
                other
            ))),
        }
    }
}
