//! Canonical identity of references and sequences

use crate::test_utils::*;
use proptest::prelude::*;
use std::sync::Arc;
use tallydb::layers::storage::MemoryManager;
use tallydb::{Data, Database, TallyError};

fn with_decisions(n: usize) -> Database {
    let db = ephemeral_db();
    for i in 0..n {
        db.create(Data::new(format!("r{}", i))).unwrap();
    }
    db
}

#[test]
fn test_reference_value_of_is_canonical() {
    let manager = MemoryManager::new(64, 16).unwrap();
    let a = manager.reference(17).unwrap();
    let b = manager.reference(17).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_sequence_value_of_is_canonical() {
    let db = with_decisions(3);
    let a = db.decisions().sequence(3).unwrap();
    let b = db.decisions().sequence(3).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_negative_ids_fail() {
    let db = ephemeral_db();
    assert!(matches!(
        db.decisions().sequence(-5),
        Err(TallyError::InvalidReference { .. })
    ));
    assert!(matches!(
        db.read_by_reference(-5),
        Err(TallyError::InvalidReference { .. })
    ));
}

#[test]
fn test_unissued_ids_fail() {
    let db = with_decisions(2);
    assert!(matches!(
        db.decisions().sequence(3),
        Err(TallyError::InvalidReference { .. })
    ));
    let manager = MemoryManager::new(64, 16).unwrap();
    assert!(matches!(
        manager.reference(64),
        Err(TallyError::InvalidReference { .. })
    ));
}

#[test]
fn test_shutdown_resets_identity_tables() {
    let db = with_decisions(1);
    let before = db.decisions().sequence(1).unwrap();
    db.shutdown().unwrap();
    let after = db.decisions().sequence(1).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before, after);
}

proptest! {
    #[test]
    fn prop_range_of_has_exact_cardinality(start in 0i64..1000, len in 0i64..200) {
        let manager = MemoryManager::new(1200, 64).unwrap();
        let end = start + len;
        let range = manager.reference_range(start, end).unwrap();
        prop_assert_eq!(range.len() as i64, end - start + 1);
        prop_assert!(range.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(range[0].as_u64() as i64, start);
    }

    #[test]
    fn prop_inverted_range_fails(start in 0i64..1000, gap in 1i64..100) {
        let manager = MemoryManager::new(8, 8).unwrap();
        prop_assert!(manager.reference_range(start, start - gap).is_err());
    }

    #[test]
    fn prop_negative_value_of_fails(id in i64::MIN..0) {
        let manager = MemoryManager::new(8, 8).unwrap();
        prop_assert!(manager.reference(id).is_err());
    }
}
