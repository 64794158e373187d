use std::path::Path;

use chrono::{NaiveDate, Utc};
use usage_core::{DateRange, StatsResponse, Summary, round_cost};
use usage_db::Db;
use usage_sync::sync_usage;

use crate::error::{AppError, Result};

/// Validates optional `YYYY-MM-DD` bounds into a [`DateRange`].
pub fn validate_range(start: Option<String>, end: Option<String>) -> Result<DateRange> {
    for bound in [&start, &end].into_iter().flatten() {
        NaiveDate::parse_from_str(bound, "%Y-%m-%d").map_err(|_| {
            AppError::InvalidInput(format!("invalid date '{bound}', expected YYYY-MM-DD"))
        })?;
    }
    Ok(DateRange { start, end })
}

/// Refreshes the cache from the session logs, then aggregates the requested
/// views out of it. Every view in the response is computed over the same
/// committed snapshot.
pub fn collect_stats(
    db: &mut Db,
    agents_dir: &Path,
    range: &DateRange,
) -> Result<StatsResponse> {
    let sync = sync_usage(db, agents_dir)?;

    let totals = db.totals(range)?;
    let agent_totals = db.agent_totals(range)?;
    let model_totals = db.model_totals(range)?;
    let daily_tokens = db.daily_totals(range)?;
    let heatmap = db.heatmap(range)?;
    let session_files = db.session_file_count()?;

    let summary = Summary {
        total_tokens: totals.tokens,
        total_cost: round_cost(totals.cost),
        usage_records: totals.records,
        session_files,
        agent_count: agent_totals.len() as i64,
        model_count: model_totals.len() as i64,
        day_count: daily_tokens.len() as i64,
    };

    Ok(StatsResponse {
        generated_at: Utc::now().to_rfc3339(),
        source: agents_dir.display().to_string(),
        cached: true,
        sync,
        summary,
        agent_totals,
        model_totals,
        daily_tokens,
        heatmap,
    })
}
