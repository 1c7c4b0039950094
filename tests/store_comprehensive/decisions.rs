//! Sequence order and rollback

use crate::test_utils::*;
use tallydb::layers::durability::{PersistenceStore, SqliteStore};
use tallydb::{Data, DatabaseBuilder, RequestContext, RequestType, Sequence, TallyError};
use tempfile::TempDir;

#[test]
fn test_sequences_increase_by_one() {
    let db = ephemeral_db();
    for i in 0..25 {
        let before = db.latest_decision();
        db.create(Data::new(format!("r{}", i))).unwrap();
        assert_eq!(db.latest_decision(), before.next());
    }
    assert_eq!(db.latest_decision(), Sequence::new(25));
}

#[test]
fn test_read_request_always_rejected() {
    let db = ephemeral_db();
    db.create(Data::new("a")).unwrap();
    for _ in 0..3 {
        let err = db
            .write(RequestContext::new(RequestType::Read, Data::new("a")))
            .unwrap_err();
        assert!(matches!(err, TallyError::UnsupportedRequest { .. }));
    }
    assert_eq!(db.latest_decision(), Sequence::new(1));
}

#[test]
fn test_reverse_all_resets_to_zero_and_empties_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("decisions.db");
    {
        let db = DatabaseBuilder::new()
            .config(file_config(&temp_dir))
            .open()
            .unwrap();
        for i in 0..12 {
            db.create(Data::new(format!("r{}", i))).unwrap();
        }
        db.flush().unwrap();
        db.create(Data::new("unflushed")).unwrap();

        db.decisions().reverse_all().unwrap();
        assert_eq!(db.latest_decision(), Sequence::ZERO);
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.row_count().unwrap(), 0);
    assert_eq!(store.last_sequence().unwrap(), Sequence::ZERO);
}

#[test]
fn test_read_range_returns_durable_decisions_in_order() {
    let db = ephemeral_db();
    db.create(Data::new("a")).unwrap();
    db.update(Data::new("a").with_related(["b"])).unwrap();
    db.create(Data::new("b")).unwrap();
    db.delete("a").unwrap();
    db.flush().unwrap();

    let log = db
        .decisions()
        .read_range(Sequence::new(1), Sequence::new(4))
        .unwrap();
    let kinds: Vec<RequestType> = log.iter().map(|d| d.request_type()).collect();
    assert_eq!(
        kinds,
        vec![
            RequestType::Create,
            RequestType::Update,
            RequestType::Create,
            RequestType::Delete
        ]
    );
    assert_eq!(log[1].payload().related_ids, vec!["b".to_string()]);
}
