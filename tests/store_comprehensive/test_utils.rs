//! Shared helpers for the comprehensive suite

use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tallydb::{Data, Database, DatabaseBuilder, TallyConfig};
use tempfile::TempDir;

/// Small in-memory database; the flush thread effectively never fires
pub fn ephemeral_db() -> Database {
    DatabaseBuilder::new()
        .config(small_config())
        .ephemeral()
        .unwrap()
}

/// Small file-backed database configuration rooted in `dir`
pub fn file_config(dir: &TempDir) -> TallyConfig {
    small_config().store_location(dir.path().join("decisions.db"))
}

fn small_config() -> TallyConfig {
    TallyConfig::new()
        .capacity(512)
        .block_size(64)
        .batch_size(8)
        .flush_interval(Duration::from_secs(3600))
}

/// Payload with a body derived from the id
pub fn record(id: &str, related: &[&str]) -> Data {
    Data::new(id)
        .with_body(json!({ "id": id, "size": id.len() }))
        .with_related(related.iter().copied())
}

/// `id → (payload, sorted outgoing link ids)` for every live record
pub fn snapshot(db: &Database) -> BTreeMap<String, (Data, Vec<String>)> {
    db.filter_by_reference_range(0, db.info().capacity as i64 - 1)
        .unwrap()
        .into_iter()
        .map(|graph| {
            let mut links: Vec<String> = graph
                .related
                .links
                .iter()
                .map(|l| l.data.id.clone())
                .collect();
            links.sort();
            (graph.data.id.clone(), (graph.data, links))
        })
        .collect()
}
