//! Request-level orchestration: validate input, sync the cache, aggregate.

mod error;
mod stats;

pub use error::{AppError, Result};
pub use stats::{collect_stats, validate_range};
