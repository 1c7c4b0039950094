//! Error types for Tally
//!
//! All layers report failures through [`TallyError`]. Validation failures
//! (`InvalidReference`, `UnsupportedRequest`) abort only the request that
//! raised them; `PersistenceFailure` raised by a background flush is retried
//! on the next tick rather than surfaced to a caller.

use crate::types::{RequestType, Sequence};
use thiserror::Error;

/// Result alias used throughout the workspace
pub type TallyResult<T> = Result<T, TallyError>;

/// Boxed error source carried by persistence failures
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the store
#[derive(Debug, Error)]
pub enum TallyError {
    /// Negative, unallocated, out-of-range or otherwise unusable reference or sequence
    #[error("invalid reference: {reason}")]
    InvalidReference {
        /// Human-readable reason
        reason: String,
    },

    /// Request type that cannot become a decision (`Read` or none at all)
    #[error("unsupported request type: {}", request_type.map(|t| t.as_str()).unwrap_or("none"))]
    UnsupportedRequest {
        /// The offending request type, if one was supplied
        request_type: Option<RequestType>,
    },

    /// No block or location could admit the write
    #[error("capacity exceeded for {resource}: limit {limit}, requested {requested}")]
    CapacityExceeded {
        /// Which resource ran out
        resource: String,
        /// Configured limit
        limit: u64,
        /// Amount that was requested
        requested: u64,
    },

    /// Connection, commit or read failure against the persistence store
    #[error("persistence failure: {message}")]
    PersistenceFailure {
        /// Human-readable message
        message: String,
        /// Underlying driver error, if any
        #[source]
        source: Option<BoxedSource>,
    },

    /// A single decision could not be applied during startup replay
    #[error("replay of decision {sequence} failed: {reason}")]
    RecoveryReplayFailure {
        /// Sequence of the decision that failed
        sequence: Sequence,
        /// Why it failed
        reason: String,
    },

    /// Malformed input such as a bad configuration value or a duplicate create
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Human-readable message
        message: String,
    },

    /// Payload or row could not be encoded or decoded
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable message
        message: String,
    },
}

impl TallyError {
    /// Create an `InvalidReference` error
    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        TallyError::InvalidReference {
            reason: reason.into(),
        }
    }

    /// Create an `UnsupportedRequest` error
    pub fn unsupported_request(request_type: Option<RequestType>) -> Self {
        TallyError::UnsupportedRequest { request_type }
    }

    /// Create a `CapacityExceeded` error
    pub fn capacity_exceeded(resource: impl Into<String>, limit: u64, requested: u64) -> Self {
        TallyError::CapacityExceeded {
            resource: resource.into(),
            limit,
            requested,
        }
    }

    /// Create a `PersistenceFailure` without an underlying source
    pub fn persistence(message: impl Into<String>) -> Self {
        TallyError::PersistenceFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Create a `PersistenceFailure` wrapping a driver error
    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TallyError::PersistenceFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a `RecoveryReplayFailure` error
    pub fn replay_failure(sequence: Sequence, reason: impl Into<String>) -> Self {
        TallyError::RecoveryReplayFailure {
            sequence,
            reason: reason.into(),
        }
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TallyError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a `Serialization` error
    pub fn serialization(message: impl Into<String>) -> Self {
        TallyError::Serialization {
            message: message.into(),
        }
    }

    /// True for errors that only reject the current request
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TallyError::InvalidReference { .. }
                | TallyError::UnsupportedRequest { .. }
                | TallyError::InvalidInput { .. }
        )
    }

    /// True for errors the flush scheduler retries on its next tick
    pub fn is_retryable(&self) -> bool {
        matches!(self, TallyError::PersistenceFailure { .. })
    }
}
