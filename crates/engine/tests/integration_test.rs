//! Engine integration tests
//!
//! These tests exercise a file-backed database end-to-end:
//! - write, flush, reopen, replay
//! - relationships surviving a restart
//! - lenient and strict handling of a damaged log
//! - scheduled flushing without an explicit flush call

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{Data, Decision, RecoveryMode, RequestType, Sequence, TallyConfig, TallyError};
use tally_durability::{PersistenceStore, SqliteStore};
use tally_engine::{Database, DatabaseBuilder};
use tempfile::TempDir;

fn config(dir: &TempDir) -> TallyConfig {
    TallyConfig::new()
        .capacity(256)
        .block_size(32)
        .batch_size(4)
        .store_location(dir.path().join("decisions.db"))
}

/// Test: write → flush → reopen → records restored
#[test]
fn test_end_to_end_write_restart_read() {
    let temp_dir = TempDir::new().unwrap();

    // Phase 1: Write data
    {
        let db = DatabaseBuilder::new().config(config(&temp_dir)).open().unwrap();
        db.create(Data::new("greeting").with_body(json!("Hello, World!")))
            .unwrap();
        db.create(Data::new("count").with_body(json!(42))).unwrap();
        db.create(Data::new("status").with_body(json!("running")))
            .unwrap();
        db.update(Data::new("status").with_body(json!("done")))
            .unwrap();
        db.delete("count").unwrap();

        db.flush().unwrap();
    }

    // Phase 2: Reopen and verify
    {
        let db = DatabaseBuilder::new().config(config(&temp_dir)).open().unwrap();

        assert_eq!(db.recovery_report().replayed, 5);
        assert!(db.recovery_report().is_clean());
        assert_eq!(db.latest_decision(), Sequence::new(5));

        let greeting = db.read_by_id("greeting").unwrap().unwrap();
        assert_eq!(greeting.data.body, json!("Hello, World!"));
        let status = db.read_by_id("status").unwrap().unwrap();
        assert_eq!(status.data.body, json!("done"));
        assert_eq!(status.sequence, Sequence::new(4));
        assert!(db.read_by_id("count").unwrap().is_none());

        // New decisions continue the order
        db.create(Data::new("after")).unwrap();
        assert_eq!(db.latest_decision(), Sequence::new(6));
    }
}

/// Test: shutdown on drop performs the final flush
#[test]
fn test_drop_flushes_pending_decisions() {
    let temp_dir = TempDir::new().unwrap();
    let slow = config(&temp_dir).flush_interval(Duration::from_secs(3600));

    {
        let db = DatabaseBuilder::new().config(slow.clone()).open().unwrap();
        for i in 0..10 {
            db.create(Data::new(format!("k{}", i))).unwrap();
        }
        assert_eq!(db.info().buffered_decisions, 10);
    }

    let db = DatabaseBuilder::new().config(slow).open().unwrap();
    assert_eq!(db.info().live_records, 10);
}

/// Test: relationships are rebuilt by replay
#[test]
fn test_relationships_survive_restart() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = DatabaseBuilder::new().config(config(&temp_dir)).open().unwrap();
        db.create(Data::new("order").with_related(["customer", "product"]))
            .unwrap();
        db.create(Data::new("customer")).unwrap();
        db.create(Data::new("product")).unwrap();
        db.shutdown().unwrap();
    }

    let db = DatabaseBuilder::new().config(config(&temp_dir)).open().unwrap();
    let order = db.read_by_id("order").unwrap().unwrap();
    let mut linked: Vec<&str> = order
        .related
        .links
        .iter()
        .map(|l| l.data.id.as_str())
        .collect();
    linked.sort();
    assert_eq!(linked, vec!["customer", "product"]);

    let customer = db.read_by_id("customer").unwrap().unwrap();
    assert_eq!(customer.related.references[0].data.id, "order");
}

/// Seed a log whose second decision cannot be applied
fn seed_damaged_log(dir: &TempDir) {
    let store = SqliteStore::open(dir.path().join("decisions.db")).unwrap();
    let at = Utc::now();
    store
        .insert_batch(&[
            Decision::new(Sequence::new(1), at, RequestType::Create, Data::new("a")),
            Decision::new(Sequence::new(2), at, RequestType::Delete, Data::new("ghost")),
            Decision::new(Sequence::new(3), at, RequestType::Create, Data::new("b")),
        ])
        .unwrap();
    store.close().unwrap();
}

/// Test: lenient replay skips and reports the bad decision
#[test]
fn test_lenient_recovery_quarantines_bad_decision() {
    let temp_dir = TempDir::new().unwrap();
    seed_damaged_log(&temp_dir);

    let db = DatabaseBuilder::new().config(config(&temp_dir)).open().unwrap();
    let report = db.recovery_report();
    assert_eq!(report.replayed, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, Sequence::new(2));
    assert!(db.read_by_id("a").unwrap().is_some());
    assert!(db.read_by_id("b").unwrap().is_some());
    assert_eq!(db.latest_decision(), Sequence::new(3));
}

/// Test: strict replay refuses to open over a bad decision
#[test]
fn test_strict_recovery_aborts_open() {
    let temp_dir = TempDir::new().unwrap();
    seed_damaged_log(&temp_dir);

    let result = DatabaseBuilder::new()
        .config(config(&temp_dir).recovery_mode(RecoveryMode::Strict))
        .open();
    match result {
        Err(TallyError::RecoveryReplayFailure { sequence, .. }) => {
            assert_eq!(sequence, Sequence::new(2))
        }
        other => panic!("expected replay failure, got {:?}", other.map(|_| ())),
    }
}

/// Test: the scheduler makes decisions durable without an explicit flush
#[test]
fn test_scheduled_flush() {
    let temp_dir = TempDir::new().unwrap();
    let fast = config(&temp_dir).flush_interval(Duration::from_millis(10));
    let db = Arc::new(DatabaseBuilder::new().config(fast).open().unwrap());

    db.create(Data::new("x")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while db.info().durable_sequence < Sequence::new(1) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(db.info().durable_sequence, Sequence::new(1));
    assert!(db.info().counters.flushes >= 1);
}

/// Test: `Database::open` with just a path
#[test]
fn test_open_by_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("by_path.db");
    {
        let db = Database::open(&path).unwrap();
        db.create(Data::new("one")).unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert!(db.read_by_id("one").unwrap().is_some());
}
