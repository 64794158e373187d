use rusqlite::{OptionalExtension, Savepoint, Transaction, params};
use usage_core::UsageRecord;

use crate::error::{DbError, Result};

/// One transactional sync pass over the session files.
///
/// Per-file work runs inside a [`FileScope`] savepoint so a bad file rolls
/// back alone; the batch itself commits once at the end of the pass.
pub struct SyncBatch<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> SyncBatch<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    /// Opens a savepoint for one session file. Dropping the scope without
    /// calling [`FileScope::commit`] rolls back everything it wrote.
    pub fn file_scope(&mut self) -> Result<FileScope<'_>> {
        Ok(FileScope {
            sp: self.tx.savepoint()?,
        })
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

pub struct FileScope<'a> {
    sp: Savepoint<'a>,
}

impl FileScope<'_> {
    /// Committed read offset for this file, or `None` when unseen.
    pub fn last_offset(&self, file_path: &str) -> Result<Option<i64>> {
        self.sp
            .query_row(
                "SELECT last_offset FROM file_state WHERE file_path = ?1",
                params![file_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Drops every record previously extracted from this file. Used when a
    /// file shrank below its stored offset and must be re-read from scratch.
    pub fn delete_file_records(&self, file_path: &str) -> Result<()> {
        self.sp.execute(
            "DELETE FROM usage_records WHERE source_file = ?1",
            params![file_path],
        )?;
        Ok(())
    }

    pub fn reset_offset(&self, file_path: &str) -> Result<()> {
        self.sp.execute(
            "UPDATE file_state SET last_offset = 0 WHERE file_path = ?1",
            params![file_path],
        )?;
        Ok(())
    }

    /// Inserts one record keyed by its source position. The unique index on
    /// `(source_file, source_offset)` makes a duplicate insert fail, which
    /// rolls the whole file back rather than double counting.
    pub fn insert_record(
        &self,
        record: &UsageRecord,
        source_file: &str,
        source_offset: i64,
    ) -> Result<()> {
        self.sp.execute(
            "INSERT INTO usage_records
                 (agent_name, model, date_key, tokens, cost, hour, dow, source_file, source_offset)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.agent_name,
                record.model,
                record.date_key,
                record.tokens,
                record.cost,
                record.hour.map(i64::from),
                record.dow.map(i64::from),
                source_file,
                source_offset,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_file_state(
        &self,
        file_path: &str,
        agent_name: &str,
        last_offset: i64,
    ) -> Result<()> {
        self.sp.execute(
            "INSERT INTO file_state (file_path, agent_name, last_offset)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO UPDATE SET
                 agent_name = excluded.agent_name,
                 last_offset = excluded.last_offset",
            params![file_path, agent_name, last_offset],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.sp.commit()?;
        Ok(())
    }
}
