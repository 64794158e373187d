use usage_core::UsageRecord;
use usage_db::Db;

pub fn open_temp_db(dir: &tempfile::TempDir) -> Db {
    let mut db = Db::open(dir.path().join("cache.db")).unwrap();
    db.ensure_schema().unwrap();
    db
}

pub fn record(
    agent: &str,
    model: &str,
    date_key: &str,
    tokens: i64,
    cost: f64,
    clock: Option<(u32, u32)>,
) -> UsageRecord {
    UsageRecord {
        agent_name: agent.to_string(),
        model: model.to_string(),
        date_key: date_key.to_string(),
        tokens,
        cost,
        hour: clock.map(|(hour, _)| hour),
        dow: clock.map(|(_, dow)| dow),
    }
}

/// Commits the given records as if one sync pass had extracted them all
/// from a single session file.
pub fn seed(db: &mut Db, records: &[UsageRecord]) {
    let mut batch = db.sync_batch().unwrap();
    let scope = batch.file_scope().unwrap();
    for (i, record) in records.iter().enumerate() {
        scope.insert_record(record, "seed.jsonl", i as i64).unwrap();
    }
    scope
        .upsert_file_state("seed.jsonl", "seed", records.len() as i64)
        .unwrap();
    scope.commit().unwrap();
    batch.commit().unwrap();
}
