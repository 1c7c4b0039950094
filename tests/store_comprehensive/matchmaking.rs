//! Forward references and insertion-order independence

use crate::test_utils::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tallydb::Data;

#[test]
fn test_a_before_b_is_linked_retroactively() {
    let db = ephemeral_db();
    db.create(record("A", &["B"])).unwrap();
    let a = db.read_by_id("A").unwrap().unwrap();
    assert!(a.related.links.is_empty());

    let b_ref = db.create(record("B", &[])).unwrap();
    let a = db.read_by_id("A").unwrap().unwrap();
    assert_eq!(a.related.link_refs(), vec![b_ref]);
}

#[test]
fn test_match_order_does_not_change_the_link() {
    let forward = ephemeral_db();
    forward.create(record("A", &["B"])).unwrap();
    forward.create(record("B", &[])).unwrap();

    let backward = ephemeral_db();
    backward.create(record("B", &[])).unwrap();
    backward.create(record("A", &["B"])).unwrap();

    assert_eq!(snapshot(&forward), snapshot(&backward));
}

#[test]
fn test_shuffled_insertion_orders_converge() {
    let records: Vec<Data> = vec![
        record("invoice", &["customer", "line-1", "line-2"]),
        record("line-1", &["product-a", "invoice"]),
        record("line-2", &["product-b", "invoice"]),
        record("customer", &["address"]),
        record("address", &[]),
        record("product-a", &["supplier"]),
        record("product-b", &["supplier"]),
        record("supplier", &["address", "supplier"]),
    ];

    let build = |order: &[Data]| {
        let db = ephemeral_db();
        for data in order {
            db.create(data.clone()).unwrap();
        }
        let snap = snapshot(&db);
        assert_eq!(db.info().pending_relations, 0);
        snap
    };

    let expected = build(&records);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7a11);
    for _ in 0..25 {
        let mut order = records.clone();
        order.shuffle(&mut rng);
        assert_eq!(build(&order), expected);
    }
}

#[test]
fn test_deleted_target_is_relinked_on_recreate() {
    let db = ephemeral_db();
    db.create(record("child", &["parent"])).unwrap();
    db.create(record("parent", &[])).unwrap();
    db.delete("parent").unwrap();
    assert!(db.read_by_id("child").unwrap().unwrap().related.is_empty());

    let parent = db.create(record("parent", &[])).unwrap();
    let child = db.read_by_id("child").unwrap().unwrap();
    assert_eq!(child.related.link_refs(), vec![parent]);
}

#[test]
fn test_update_moves_relations() {
    let db = ephemeral_db();
    db.create(record("x", &[])).unwrap();
    db.create(record("y", &[])).unwrap();
    db.create(record("n", &["x"])).unwrap();
    db.update(record("n", &["y"])).unwrap();

    let snap = snapshot(&db);
    assert_eq!(snap["n"].1, vec!["y".to_string()]);
    assert!(db.read_by_id("x").unwrap().unwrap().related.is_empty());
}
