use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sentinel date bucket for records without a usable timestamp.
pub const UNKNOWN_DATE_KEY: &str = "unknown";

/// One normalized usage record extracted from a session log line.
///
/// `hour` and `dow` are derived together from the same timestamp: either
/// both are present or both are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub agent_name: String,
    pub model: String,
    /// Local calendar date `YYYY-MM-DD`, or [`UNKNOWN_DATE_KEY`].
    pub date_key: String,
    pub tokens: i64,
    pub cost: f64,
    /// Local hour of day, 0-23.
    pub hour: Option<u32>,
    /// Local day of week, 0 = Monday .. 6 = Sunday.
    pub dow: Option<u32>,
}

/// A JSONL session file paired with the agent that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub agent_name: String,
    pub path: PathBuf,
}

/// Counters describing one sync pass over the session files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub new_records: i64,
    pub synced_files: i64,
    pub skipped_files: i64,
}

/// Optional inclusive date range, each bound `YYYY-MM-DD` or unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTotal {
    pub agent: String,
    pub tokens: i64,
    pub cost: f64,
    pub records: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTotal {
    pub model: String,
    pub tokens: i64,
    pub cost: f64,
    pub records: i64,
}

/// Per-day totals, keyed by date_key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: String,
    pub tokens: i64,
    pub cost: f64,
    pub records: i64,
}

/// Aggregate totals for one (day-of-week, hour-of-day) bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub dow: u32,
    pub hour: u32,
    pub tokens: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_tokens: i64,
    pub total_cost: f64,
    pub usage_records: i64,
    pub session_files: i64,
    pub agent_count: i64,
    pub model_count: i64,
    pub day_count: i64,
}

/// Full stats payload served for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub generated_at: String,
    pub source: String,
    pub cached: bool,
    pub sync: SyncResult,
    pub summary: Summary,
    pub agent_totals: Vec<AgentTotal>,
    pub model_totals: Vec<ModelTotal>,
    pub daily_tokens: Vec<DailyTotal>,
    pub heatmap: Vec<HeatmapCell>,
}

/// Rounds a cost figure to 6 decimal places for output stability.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
