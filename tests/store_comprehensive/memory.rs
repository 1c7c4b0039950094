//! Memory round trips and relationship bookkeeping

use crate::test_utils::*;
use std::sync::Arc;
use tallydb::layers::storage::{MemoryManager, MemoryOperations, StoredRecord};
use tallydb::{Data, Sequence, TallyError};

fn ops() -> MemoryOperations {
    MemoryOperations::new(Arc::new(MemoryManager::new(32, 8).unwrap()))
}

#[test]
fn test_write_read_free() {
    let ops = ops();
    let data = record("a", &[]);
    let r = ops
        .write(StoredRecord::new(data.clone(), Sequence::new(1)))
        .unwrap();
    assert_eq!(ops.read(r).unwrap(), Some(data));
    ops.free(r).unwrap();
    assert_eq!(ops.read(r).unwrap(), None);
}

#[test]
fn test_link_twice_equals_link_once() {
    let ops = ops();
    let a = ops
        .write(StoredRecord::new(Data::new("a"), Sequence::new(1)))
        .unwrap();
    let b = ops
        .write(StoredRecord::new(Data::new("b"), Sequence::new(2)))
        .unwrap();
    ops.link(a, b).unwrap();
    let once = (
        ops.read_graph(a).unwrap().unwrap().related,
        ops.read_graph(b).unwrap().unwrap().related,
    );
    ops.link(a, b).unwrap();
    let twice = (
        ops.read_graph(a).unwrap().unwrap().related,
        ops.read_graph(b).unwrap().unwrap().related,
    );
    assert_eq!(once, twice);
}

#[test]
fn test_separate_empties_the_bundle() {
    let db = ephemeral_db();
    db.create(record("hub", &["a", "b"])).unwrap();
    db.create(record("a", &["hub"])).unwrap();
    db.create(record("b", &["hub"])).unwrap();
    let hub = db.read_by_id("hub").unwrap().unwrap();
    assert_eq!(hub.related.links.len(), 2);
    assert_eq!(hub.related.references.len(), 2);

    db.delete("hub").unwrap();

    let reused = db.read_by_reference(hub.reference.as_u64() as i64).unwrap();
    assert!(reused.is_none());
    for id in ["a", "b"] {
        assert!(db.read_by_id(id).unwrap().unwrap().related.is_empty());
    }
}

#[test]
fn test_capacity_exceeded_is_not_fatal() {
    let db = tallydb::DatabaseBuilder::new()
        .config(tallydb::TallyConfig::new().capacity(4).block_size(2))
        .ephemeral()
        .unwrap();
    for i in 0..4 {
        db.create(Data::new(format!("r{}", i))).unwrap();
    }
    assert!(matches!(
        db.create(Data::new("overflow")),
        Err(TallyError::CapacityExceeded { .. })
    ));
    db.delete("r0").unwrap();
    db.create(Data::new("overflow")).unwrap();
    assert_eq!(db.info().live_records, 4);
}
