//! Incremental sync between agent session logs and the SQLite cache.
//!
//! Session files are append-mostly JSONL; the cache remembers a byte offset
//! per file and only reads what grew since the last pass. Truncated or
//! rewritten files are detected by size and re-ingested from scratch.

mod parser;
mod paths;
mod pipeline;
mod types;

pub use parser::parse_line;
pub use paths::session_files;
pub use pipeline::sync_usage;
pub use types::{Result, SyncError};
