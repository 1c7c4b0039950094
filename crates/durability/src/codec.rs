//! Row codec
//!
//! One decision is one row of the `decisions` table:
//!
//! | column          | type    | content                                  |
//! |-----------------|---------|------------------------------------------|
//! | `sequence_id`   | INTEGER | primary key                              |
//! | `decision_time` | TEXT    | RFC 3339, UTC, nanosecond precision      |
//! | `request_type`  | TEXT    | `CREATE`, `UPDATE` or `DELETE`           |
//! | `data_id`       | TEXT    | id of the mutated record                 |
//! | `payload`       | BLOB    | MessagePack encoding of the record       |

use chrono::{DateTime, SecondsFormat, Utc};
use tally_core::{Data, Decision, RequestType, Sequence, TallyError, TallyResult};

/// A decision in its stored column form
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRow {
    pub sequence_id: i64,
    pub decision_time: String,
    pub request_type: String,
    pub data_id: String,
    pub payload: Vec<u8>,
}

impl DecisionRow {
    /// Sequence of the row, or `ZERO` for a corrupt negative key
    pub fn sequence(&self) -> Sequence {
        u64::try_from(self.sequence_id)
            .map(Sequence::new)
            .unwrap_or(Sequence::ZERO)
    }
}

/// Encode a decision into its row form
pub fn encode(decision: &Decision) -> TallyResult<DecisionRow> {
    let payload = rmp_serde::to_vec_named(decision.payload()).map_err(|e| {
        TallyError::serialization(format!(
            "cannot encode payload of decision {}: {}",
            decision.sequence(),
            e
        ))
    })?;

    Ok(DecisionRow {
        sequence_id: sequence_key(decision.sequence())?,
        decision_time: decision
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
        request_type: decision.request_type().as_str().to_string(),
        data_id: decision.data_id().to_string(),
        payload,
    })
}

/// Decode a stored row
///
/// # Errors
///
/// `Serialization` for an unparsable timestamp, unknown or `READ` request
/// type, undecodable payload, or a payload whose id disagrees with `data_id`.
pub fn decode(row: DecisionRow) -> TallyResult<Decision> {
    let sequence = u64::try_from(row.sequence_id).map(Sequence::new).map_err(|_| {
        TallyError::serialization(format!("negative sequence id {}", row.sequence_id))
    })?;

    let timestamp = DateTime::parse_from_rfc3339(&row.decision_time)
        .map_err(|e| {
            TallyError::serialization(format!(
                "bad decision_time {:?} at sequence {}: {}",
                row.decision_time, sequence, e
            ))
        })?
        .with_timezone(&Utc);

    let request_type: RequestType = row.request_type.parse()?;
    if !request_type.is_mutation() {
        return Err(TallyError::serialization(format!(
            "stored decision {} has non-mutating type {}",
            sequence, request_type
        )));
    }

    let payload: Data = rmp_serde::from_slice(&row.payload).map_err(|e| {
        TallyError::serialization(format!("cannot decode payload of decision {}: {}", sequence, e))
    })?;
    if payload.id != row.data_id {
        return Err(TallyError::serialization(format!(
            "decision {} is keyed to {:?} but carries record {:?}",
            sequence, row.data_id, payload.id
        )));
    }

    Ok(Decision::new(sequence, timestamp, request_type, payload))
}

/// Primary key for a sequence
pub(crate) fn sequence_key(sequence: Sequence) -> TallyResult<i64> {
    i64::try_from(sequence.as_u64()).map_err(|_| {
        TallyError::invalid_reference(format!("sequence {} does not fit a row key", sequence))
    })
}
