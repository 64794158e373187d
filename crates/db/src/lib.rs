mod batch;
mod error;
mod schema;
mod stats;

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

pub use batch::{FileScope, SyncBatch};
pub use error::{DbError, Result};
pub use stats::CacheTotals;

pub struct Db {
    conn: Connection,
}

impl Db {
    /// Opens (or creates) the cache database.
    ///
    /// WAL with `synchronous=NORMAL` trades a small window of recent
    /// commits on power loss for write throughput; the cache is fully
    /// re-derivable from the source logs, so the trade is safe.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        Ok(Self { conn })
    }

    /// Creates the cache tables, rebuilding them from scratch when an
    /// existing store is missing a required column.
    pub fn ensure_schema(&mut self) -> Result<()> {
        schema::ensure(&mut self.conn)
    }

    /// Starts one transactional sync pass. All per-file work happens in
    /// [`FileScope`]s nested inside the returned batch; nothing is visible
    /// to readers until [`SyncBatch::commit`].
    pub fn sync_batch(&mut self) -> Result<SyncBatch<'_>> {
        Ok(SyncBatch::new(self.conn.transaction()?))
    }

    /// Last committed read offset for a session file, if the file has been
    /// synced before.
    pub fn file_offset(&self, file_path: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT last_offset FROM file_state WHERE file_path = ?1",
                params![file_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Number of session files currently tracked in `file_state`.
    pub fn session_file_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM file_state", [], |row| row.get(0))
            .map_err(DbError::from)
    }
}
