use rusqlite::params_from_iter;
use usage_core::{AgentTotal, DailyTotal, DateRange, HeatmapCell, ModelTotal, round_cost};

use crate::error::{DbError, Result};
use crate::Db;

/// Grand totals over the filtered records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheTotals {
    pub records: i64,
    pub tokens: i64,
    pub cost: f64,
}

/// Builds the WHERE fragment for an optional date range.
///
/// A bounded range also excludes the `unknown` bucket: undated records have
/// no position on the calendar, so they only show up in unfiltered views.
fn date_filter(range: &DateRange) -> (String, Vec<String>) {
    if range.is_unbounded() {
        return ("1=1".to_string(), Vec::new());
    }
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(start) = &range.start {
        clauses.push("date_key >= ?");
        args.push(start.clone());
    }
    if let Some(end) = &range.end {
        clauses.push("date_key <= ?");
        args.push(end.clone());
    }
    let filter = format!(
        "date_key != 'unknown' AND ({})",
        clauses.join(" AND ")
    );
    (filter, args)
}

impl Db {
    pub fn totals(&self, range: &DateRange) -> Result<CacheTotals> {
        let (filter, args) = date_filter(range);
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(tokens), 0), COALESCE(SUM(cost), 0.0)
             FROM usage_records WHERE {filter}"
        );
        self.conn
            .query_row(&sql, params_from_iter(args), |row| {
                Ok(CacheTotals {
                    records: row.get(0)?,
                    tokens: row.get(1)?,
                    cost: row.get(2)?,
                })
            })
            .map_err(DbError::from)
    }

    pub fn agent_totals(&self, range: &DateRange) -> Result<Vec<AgentTotal>> {
        let (filter, args) = date_filter(range);
        let sql = format!(
            "SELECT agent_name, COALESCE(SUM(tokens), 0), COALESCE(SUM(cost), 0.0), COUNT(*)
             FROM usage_records WHERE {filter}
             GROUP BY agent_name
             ORDER BY SUM(tokens) DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(AgentTotal {
                agent: row.get(0)?,
                tokens: row.get(1)?,
                cost: round_cost(row.get(2)?),
                records: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    }

    pub fn model_totals(&self, range: &DateRange) -> Result<Vec<ModelTotal>> {
        let (filter, args) = date_filter(range);
        let sql = format!(
            "SELECT model, COALESCE(SUM(tokens), 0), COALESCE(SUM(cost), 0.0), COUNT(*)
             FROM usage_records WHERE {filter}
             GROUP BY model
             ORDER BY SUM(tokens) DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(ModelTotal {
                model: row.get(0)?,
                tokens: row.get(1)?,
                cost: round_cost(row.get(2)?),
                records: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    }

    /// Per-day totals in calendar order, with the `unknown` bucket last.
    pub fn daily_totals(&self, range: &DateRange) -> Result<Vec<DailyTotal>> {
        let (filter, args) = date_filter(range);
        let sql = format!(
            "SELECT date_key, COALESCE(SUM(tokens), 0), COALESCE(SUM(cost), 0.0), COUNT(*)
             FROM usage_records WHERE {filter}
             GROUP BY date_key
             ORDER BY CASE WHEN date_key = 'unknown' THEN 1 ELSE 0 END, date_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(DailyTotal {
                date: row.get(0)?,
                tokens: row.get(1)?,
                cost: round_cost(row.get(2)?),
                records: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    }

    /// Sparse (dow, hour) grid; buckets with no timed records are absent.
    pub fn heatmap(&self, range: &DateRange) -> Result<Vec<HeatmapCell>> {
        let (filter, args) = date_filter(range);
        let sql = format!(
            "SELECT dow, hour, COALESCE(SUM(tokens), 0), COALESCE(SUM(cost), 0.0)
             FROM usage_records
             WHERE hour IS NOT NULL AND dow IS NOT NULL AND ({filter})
             GROUP BY dow, hour
             ORDER BY dow, hour"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(HeatmapCell {
                dow: row.get(0)?,
                hour: row.get(1)?,
                tokens: row.get(2)?,
                cost: round_cost(row.get(3)?),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    }
}
