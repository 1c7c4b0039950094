//! Persistence store
//!
//! The durable half of the decision log. [`PersistenceStore`] is the seam the
//! book keeper writes through; [`SqliteStore`] is the shipped implementation,
//! either file-backed or purely in memory.

use crate::codec::{self, sequence_key, DecisionRow};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tally_core::{Decision, Sequence, TallyError, TallyResult};
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS decisions(
    sequence_id INTEGER PRIMARY KEY,
    decision_time TEXT NOT NULL,
    request_type TEXT NOT NULL,
    data_id TEXT NOT NULL,
    payload BLOB NOT NULL
);";

const INSERT: &str = concat!(
    "INSERT OR REPLACE INTO decisions",
    "(sequence_id, decision_time, request_type, data_id, payload) ",
    "VALUES (?1, ?2, ?3, ?4, ?5)"
);

const SELECT_RANGE: &str = concat!(
    "SELECT sequence_id, decision_time, request_type, data_id, payload ",
    "FROM decisions WHERE sequence_id BETWEEN ?1 AND ?2 ORDER BY sequence_id"
);

/// Durable storage for decisions
pub trait PersistenceStore: Send + Sync {
    /// Highest stored sequence, `ZERO` when empty
    fn last_sequence(&self) -> TallyResult<Sequence>;

    /// Store a batch atomically; either every row commits or none does
    fn insert_batch(&self, decisions: &[Decision]) -> TallyResult<usize>;

    /// Raw rows with sequence in `start..=end`, ascending
    fn read_rows(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<DecisionRow>>;

    /// Decoded decisions with sequence in `start..=end`, ascending
    fn read_range(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<Decision>> {
        self.read_rows(start, end)?
            .into_iter()
            .map(codec::decode)
            .collect()
    }

    /// Delete one decision; false if it was not stored
    fn remove(&self, sequence: Sequence) -> TallyResult<bool>;

    /// Delete every decision, returning how many were removed
    fn clear(&self) -> TallyResult<u64>;

    /// Number of stored decisions
    fn row_count(&self) -> TallyResult<u64>;

    /// Reclaim space left by deleted rows
    fn compact(&self) -> TallyResult<()>;

    /// Release the underlying connection; later calls fail
    fn close(&self) -> TallyResult<()>;
}

/// SQLite-backed decision store
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> TallyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| {
            TallyError::persistence_with_source(
                format!("cannot open decision store at {}", path.display()),
                e,
            )
        })?;
        let store = Self::with_connection(conn, Some(path))?;
        info!(path = ?store.path, "decision store opened");
        Ok(store)
    }

    /// A store that lives only as long as this value
    pub fn open_in_memory() -> TallyResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TallyError::persistence_with_source("cannot open in-memory store", e))?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> TallyResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| TallyError::persistence_with_source("cannot create decisions table", e))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// File backing the store; `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<R>,
        context: &str,
    ) -> TallyResult<R> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| TallyError::persistence("decision store is closed"))?;
        f(conn).map_err(|e| TallyError::persistence_with_source(context.to_string(), e))
    }
}

impl PersistenceStore for SqliteStore {
    fn last_sequence(&self) -> TallyResult<Sequence> {
        let max: i64 = self.with_conn(
            |conn| {
                conn.query_row(
                    "SELECT COALESCE(MAX(sequence_id), 0) FROM decisions",
                    [],
                    |row| row.get(0),
                )
            },
            "cannot read last sequence",
        )?;
        Ok(Sequence::new(max.max(0) as u64))
    }

    fn insert_batch(&self, decisions: &[Decision]) -> TallyResult<usize> {
        if decisions.is_empty() {
            return Ok(0);
        }
        let rows = decisions
            .iter()
            .map(codec::encode)
            .collect::<TallyResult<Vec<_>>>()?;

        self.with_conn(
            |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(INSERT)?;
                    for row in &rows {
                        stmt.execute(params![
                            row.sequence_id,
                            row.decision_time,
                            row.request_type,
                            row.data_id,
                            row.payload
                        ])?;
                    }
                }
                tx.commit()
            },
            "cannot commit decision batch",
        )?;

        debug!(rows = rows.len(), "decision batch committed");
        Ok(rows.len())
    }

    fn read_rows(&self, start: Sequence, end: Sequence) -> TallyResult<Vec<DecisionRow>> {
        if end < start {
            return Err(TallyError::invalid_reference(format!(
                "sequence range end {} precedes start {}",
                end, start
            )));
        }
        let (lo, hi) = (sequence_key(start)?, sequence_key(end)?);

        self.with_conn(
            |conn| {
                let mut stmt = conn.prepare_cached(SELECT_RANGE)?;
                let rows = stmt.query_map(params![lo, hi], |row| {
                    Ok(DecisionRow {
                        sequence_id: row.get(0)?,
                        decision_time: row.get(1)?,
                        request_type: row.get(2)?,
                        data_id: row.get(3)?,
                        payload: row.get(4)?,
                    })
                })?;
                let out = rows.collect::<rusqlite::Result<Vec<_>>>();
                out
            },
            "cannot read decisions",
        )
    }

    fn remove(&self, sequence: Sequence) -> TallyResult<bool> {
        let key = sequence_key(sequence)?;
        let deleted = self.with_conn(
            |conn| conn.execute("DELETE FROM decisions WHERE sequence_id = ?1", params![key]),
            "cannot delete decision",
        )?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> TallyResult<u64> {
        let deleted = self.with_conn(
            |conn| conn.execute("DELETE FROM decisions", []),
            "cannot clear decisions",
        )?;
        Ok(deleted as u64)
    }

    fn row_count(&self) -> TallyResult<u64> {
        let count: i64 = self.with_conn(
            |conn| conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0)),
            "cannot count decisions",
        )?;
        Ok(count as u64)
    }

    fn compact(&self) -> TallyResult<()> {
        self.with_conn(|conn| conn.execute_batch("VACUUM;"), "cannot compact store")
    }

    fn close(&self) -> TallyResult<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| {
            TallyError::persistence_with_source("cannot close decision store", e)
        })?;
        info!(path = ?self.path, "decision store closed");
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tally_core::{Data, RequestType};
    use tempfile::TempDir;

    fn decision(seq: u64, id: &str) -> Decision {
        Decision::new(
            Sequence::new(seq),
            Utc::now(),
            RequestType::Create,
            Data::new(id).with_body(json!({ "seq": seq })),
        )
    }

    #[test]
    fn test_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.last_sequence().unwrap(), Sequence::ZERO);
        assert_eq!(store.row_count().unwrap(), 0);
        assert!(store
            .read_range(Sequence::new(1), Sequence::new(10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_insert_and_read_range() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch: Vec<_> = (1..=5).map(|i| decision(i, &format!("r{}", i))).collect();
        assert_eq!(store.insert_batch(&batch).unwrap(), 5);
        assert_eq!(store.last_sequence().unwrap(), Sequence::new(5));

        let middle = store.read_range(Sequence::new(2), Sequence::new(4)).unwrap();
        let seqs: Vec<u64> = middle.iter().map(|d| d.sequence().as_u64()).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(middle[0], batch[1]);
    }

    #[test]
    fn test_reinsert_replaces_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_batch(&[decision(1, "a")]).unwrap();
        store.insert_batch(&[decision(1, "b")]).unwrap();
        assert_eq!(store.row_count().unwrap(), 1);
        let rows = store.read_range(Sequence::new(1), Sequence::new(1)).unwrap();
        assert_eq!(rows[0].data_id(), "b");
    }

    #[test]
    fn test_inverted_range_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.read_range(Sequence::new(5), Sequence::new(1)).is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch: Vec<_> = (1..=3).map(|i| decision(i, "x")).collect();
        store.insert_batch(&batch).unwrap();

        assert!(store.remove(Sequence::new(3)).unwrap());
        assert!(!store.remove(Sequence::new(3)).unwrap());
        assert_eq!(store.last_sequence().unwrap(), Sequence::new(2));

        assert_eq!(store.clear().unwrap(), 2);
        assert_eq!(store.last_sequence().unwrap(), Sequence::ZERO);
        store.compact().unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("decisions.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert_batch(&[decision(1, "a"), decision(2, "b")])
                .unwrap();
            store.close().unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.last_sequence().unwrap(), Sequence::new(2));
        assert_eq!(store.row_count().unwrap(), 2);
    }

    #[test]
    fn test_closed_store_rejects_calls() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(store.close().is_ok());
        let err = store.last_sequence().unwrap_err();
        assert!(matches!(err, TallyError::PersistenceFailure { .. }));
    }

    #[test]
    fn test_corrupt_row_is_reported_by_read_range() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_batch(&[decision(1, "a")]).unwrap();
        store
            .with_conn(
                |conn| conn.execute("UPDATE decisions SET request_type = 'READ'", []),
                "corrupt",
            )
            .unwrap();
        assert_eq!(store.read_rows(Sequence::new(1), Sequence::new(1)).unwrap().len(), 1);
        assert!(store.read_range(Sequence::new(1), Sequence::new(1)).is_err());
    }
}
