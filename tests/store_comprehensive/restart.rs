//! Replaying the log reproduces memory

use crate::test_utils::*;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::BTreeSet;
use tallydb::{Data, DatabaseBuilder};
use tempfile::TempDir;

#[test]
fn test_random_workload_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let before = {
        let db = DatabaseBuilder::new()
            .config(file_config(&temp_dir))
            .open()
            .unwrap();
        let mut live: BTreeSet<String> = BTreeSet::new();

        for step in 0..300 {
            let id = format!("k{}", rng.gen_range(0..40));
            let related = format!("k{}", rng.gen_range(0..40));
            let data = Data::new(id.clone())
                .with_body(json!({ "step": step }))
                .with_related([related]);

            if !live.contains(&id) {
                db.create(data).unwrap();
                live.insert(id);
            } else if rng.gen_bool(0.3) {
                db.delete(&id).unwrap();
                live.remove(&id);
            } else {
                db.update(data).unwrap();
            }
        }
        db.flush().unwrap();
        snapshot(&db)
    };

    let db = DatabaseBuilder::new()
        .config(file_config(&temp_dir))
        .open()
        .unwrap();
    assert!(db.recovery_report().is_clean());
    assert_eq!(db.recovery_report().replayed, 300);
    assert_eq!(snapshot(&db), before);
}

#[test]
fn test_restart_after_clear_all_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = DatabaseBuilder::new()
            .config(file_config(&temp_dir))
            .open()
            .unwrap();
        db.create(record("a", &[])).unwrap();
        db.flush().unwrap();
        db.clear_all().unwrap();
    }
    let db = DatabaseBuilder::new()
        .config(file_config(&temp_dir))
        .open()
        .unwrap();
    assert_eq!(db.info().live_records, 0);
    assert_eq!(db.latest_decision().as_u64(), 0);
}
