//! Decisions: the unit of the ordered change log

use crate::data::Data;
use crate::types::{RequestType, Sequence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One accepted mutation with its position in the total order
///
/// Decisions are immutable once issued; fields are read through accessors.
/// The persistence layer stores nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    sequence: Sequence,
    timestamp: DateTime<Utc>,
    request_type: RequestType,
    data_id: String,
    payload: Data,
}

impl Decision {
    /// Assemble a decision
    ///
    /// Callers are the decision maker (which has already rejected `Read`) and
    /// the row decoder (which never produces `Read`).
    pub fn new(
        sequence: Sequence,
        timestamp: DateTime<Utc>,
        request_type: RequestType,
        payload: Data,
    ) -> Self {
        Self {
            sequence,
            timestamp,
            request_type,
            data_id: payload.id.clone(),
            payload,
        }
    }

    /// Position in the total order
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Wall-clock time the decision was made
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Create, update or delete
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Id of the record this decision mutates
    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    /// Record payload as submitted
    pub fn payload(&self) -> &Data {
        &self.payload
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Decision {{ sequence: {}, timestamp: {}, request_type: {}, data_id: {} }}",
            self.sequence,
            self.timestamp.to_rfc3339(),
            self.request_type,
            self.data_id
        )
    }
}
