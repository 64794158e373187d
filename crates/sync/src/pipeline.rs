use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use usage_core::{SessionFile, SyncResult};
use usage_db::{Db, FileScope};

use crate::parser::parse_line;
use crate::paths::session_files;
use crate::types::Result;

/// Upper bound on a single log line. Anything longer is treated as a
/// corrupt file and the file is skipped until it is repaired or rotated.
const MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

// Serializes sync passes within the process. Concurrent requests would
// otherwise race on the shared offsets and each other's savepoints.
static SYNC_LOCK: Mutex<()> = Mutex::new(());

enum FileOutcome {
    Unchanged,
    Synced { new_records: i64 },
}

/// Brings the cache up to date with the session files under `agents_dir`.
///
/// Each file is processed inside its own savepoint: a file that fails
/// mid-read rolls back alone and keeps its old offset, while the rest of
/// the pass commits. Only the final batch commit makes anything visible.
pub fn sync_usage(db: &mut Db, agents_dir: &Path) -> Result<SyncResult> {
    let _guard = SYNC_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let files = session_files(agents_dir)?;
    let mut result = SyncResult::default();
    let mut batch = db.sync_batch()?;
    for file in &files {
        let scope = batch.file_scope()?;
        match sync_one_file(&scope, file) {
            Ok(FileOutcome::Unchanged) => {
                // Still commits: a truncation-to-empty writes its delete
                // and offset reset before landing here.
                scope.commit()?;
                result.skipped_files += 1;
            }
            Ok(FileOutcome::Synced { new_records }) => {
                scope.commit()?;
                result.synced_files += 1;
                result.new_records += new_records;
            }
            Err(err) => {
                // Dropping the scope rolls back this file's writes; its
                // stored offset stays put for the next pass.
                tracing::warn!(file = %file.path.display(), error = %err, "skipping session file");
                result.skipped_files += 1;
            }
        }
    }
    batch.commit()?;

    tracing::debug!(
        new_records = result.new_records,
        synced_files = result.synced_files,
        skipped_files = result.skipped_files,
        "sync pass complete"
    );
    Ok(result)
}

fn sync_one_file(scope: &FileScope<'_>, file: &SessionFile) -> Result<FileOutcome> {
    let path = file.path.to_string_lossy();
    let mut offset = scope.last_offset(&path)?.unwrap_or(0);
    let size = file.path.metadata()?.len() as i64;

    let truncated = size < offset;
    if truncated {
        // The file shrank under us: whatever we extracted before came from
        // bytes that no longer exist, so rebuild it from the start.
        tracing::debug!(file = %path, stored = offset, size, "file truncated, re-reading");
        scope.delete_file_records(&path)?;
        scope.reset_offset(&path)?;
        offset = 0;
    }
    if size <= offset {
        return Ok(FileOutcome::Unchanged);
    }

    let mut reader = BufReader::new(File::open(&file.path)?);
    reader.seek(SeekFrom::Start(offset as u64))?;

    let mut new_records = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .by_ref()
            .take((MAX_LINE_BYTES + 1) as u64)
            .read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
        if line.len() > MAX_LINE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {MAX_LINE_BYTES} bytes"),
            )
            .into());
        }
        let line_offset = offset;
        offset += line.len() as i64 + 1;
        // Lines that are not valid UTF-8 or not usage lines are dropped;
        // the offset still advances past them.
        if let Ok(text) = std::str::from_utf8(line) {
            if let Some(record) = parse_line(&file.agent_name, text) {
                scope.insert_record(&record, &path, line_offset)?;
                new_records += 1;
            }
        }
    }

    scope.upsert_file_state(&path, &file.agent_name, offset)?;
    Ok(FileOutcome::Synced { new_records })
}
