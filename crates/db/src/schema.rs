use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_state (
    file_path   TEXT PRIMARY KEY,
    agent_name  TEXT    NOT NULL,
    last_offset INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS usage_records (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_name    TEXT    NOT NULL,
    model         TEXT    NOT NULL,
    date_key      TEXT    NOT NULL,
    tokens        INTEGER NOT NULL,
    cost          REAL    NOT NULL DEFAULT 0.0,
    hour          INTEGER,
    dow           INTEGER,
    source_file   TEXT    NOT NULL,
    source_offset INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rec_agent ON usage_records(agent_name);
CREATE INDEX IF NOT EXISTS idx_rec_model ON usage_records(model);
CREATE INDEX IF NOT EXISTS idx_rec_date  ON usage_records(date_key);
CREATE INDEX IF NOT EXISTS idx_rec_source_file ON usage_records(source_file);
CREATE UNIQUE INDEX IF NOT EXISTS idx_rec_source_line
    ON usage_records(source_file, source_offset);
"#;

/// Columns older deployments lacked; their absence forces a rebuild.
const REQUIRED_USAGE_COLUMNS: &[&str] = &["hour", "dow", "source_file", "source_offset"];

/// Creates the tables and indexes if needed.
///
/// When `usage_records` exists but is missing a required column, both cache
/// tables are dropped and recreated empty; the next sync pass re-reads every
/// session file from offset zero, so the rebuild is lossless.
pub(crate) fn ensure(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    if table_needs_rebuild(&tx)? {
        tx.execute("DROP TABLE IF EXISTS usage_records", [])?;
        tx.execute("DROP TABLE IF EXISTS file_state", [])?;
    }
    tx.execute_batch(SCHEMA)?;
    tx.commit()?;
    Ok(())
}

fn table_needs_rebuild(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(usage_records)")?;
    let mut rows = stmt.query([])?;
    let mut table_exists = false;
    let mut seen = Vec::new();
    while let Some(row) = rows.next()? {
        table_exists = true;
        let name: String = row.get(1)?;
        if REQUIRED_USAGE_COLUMNS.contains(&name.as_str()) {
            seen.push(name);
        }
    }
    Ok(table_exists && seen.len() != REQUIRED_USAGE_COLUMNS.len())
}
