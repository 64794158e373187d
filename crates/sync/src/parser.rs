use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike, Utc};
use serde_json::Value;
use usage_core::{UNKNOWN_DATE_KEY, UsageRecord};

/// Keys that carry a ready-made total. Checked in order; the first one that
/// coerces to a positive count wins.
const TOTAL_KEYS: &[&str] = &["totalTokens", "total_tokens", "total", "tokens"];

/// Component counters summed when no usable total is present. Positive
/// values only, so a provider reporting `-1` for "not applicable" cannot
/// drag the sum down.
const COMPONENT_KEYS: &[&str] = &[
    "input",
    "output",
    "cacheRead",
    "cacheWrite",
    "input_tokens",
    "output_tokens",
    "cache_read_input_tokens",
    "cache_creation_input_tokens",
    "reasoning_tokens",
];

const MODEL_KEYS: &[&str] = &["model", "modelId", "model_id"];

/// Parses one session log line into a usage record.
///
/// Lines that are not JSON objects, or that carry no positive token count,
/// yield `None`; the caller drops them and moves on. Everything else is
/// tolerated: missing model falls back to `unknown`, missing cost to zero,
/// and an unparseable timestamp lands in the [`UNKNOWN_DATE_KEY`] bucket.
pub fn parse_line(agent_name: &str, line: &str) -> Option<UsageRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let obj = value.as_object()?;

    let message = obj.get("message").and_then(Value::as_object);
    let usage = message
        .and_then(|m| m.get("usage"))
        .filter(|v| v.is_object())
        .or_else(|| obj.get("usage").filter(|v| v.is_object()));

    let tokens = usage.map_or(0, extract_tokens);
    if tokens <= 0 {
        return None;
    }

    let model = extract_model(message, obj);
    let cost = extract_cost(obj, usage);
    let (date_key, hour, dow) = match extract_timestamp(obj, message) {
        Some(ts) => {
            let (date_key, hour, dow) = local_date_parts(ts);
            (date_key, Some(hour), Some(dow))
        }
        None => (UNKNOWN_DATE_KEY.to_string(), None, None),
    };

    Some(UsageRecord {
        agent_name: agent_name.to_string(),
        model,
        date_key,
        tokens,
        cost,
        hour,
        dow,
    })
}

fn extract_tokens(usage: &Value) -> i64 {
    for key in TOTAL_KEYS {
        if let Some(v) = usage.get(*key) {
            let n = coerce_count(v);
            if n > 0 {
                return n;
            }
        }
    }
    let mut sum = 0;
    for key in COMPONENT_KEYS {
        if let Some(v) = usage.get(*key) {
            let n = coerce_count(v);
            if n > 0 {
                sum += n;
            }
        }
    }
    sum
}

/// Best-effort conversion of a JSON value to a token count. Numbers are
/// truncated, numeric strings parsed, `true` counts as one, and anything
/// else is zero.
fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_f64().map_or(0, |v| v as i64),
        Value::String(s) => s.trim().parse::<f64>().map_or(0, |v| v as i64),
        Value::Bool(true) => 1,
        _ => 0,
    }
}

fn extract_model(
    message: Option<&serde_json::Map<String, Value>>,
    obj: &serde_json::Map<String, Value>,
) -> String {
    let scopes = [message, Some(obj)];
    for scope in scopes.into_iter().flatten() {
        for key in MODEL_KEYS {
            if let Some(name) = scope.get(*key).and_then(Value::as_str) {
                let name = name.trim();
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    "unknown".to_string()
}

fn extract_cost(obj: &serde_json::Map<String, Value>, usage: Option<&Value>) -> f64 {
    if let Some(v) = obj.get("costUsd").and_then(Value::as_f64) {
        return v;
    }
    if let Some(cost) = usage.and_then(|u| u.get("cost")) {
        if let Some(v) = cost.as_f64() {
            return v;
        }
        if let Some(v) = cost.get("total").and_then(Value::as_f64) {
            return v;
        }
    }
    0.0
}

fn extract_timestamp(
    obj: &serde_json::Map<String, Value>,
    message: Option<&serde_json::Map<String, Value>>,
) -> Option<DateTime<Utc>> {
    obj.get("timestamp")
        .and_then(parse_timestamp)
        .or_else(|| message.and_then(|m| m.get("timestamp")).and_then(parse_timestamp))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let mut v = n.as_f64()?;
            // Epoch milliseconds are ~13 digits; seconds fit in 11.
            if v > 10_000_000_000.0 {
                v /= 1000.0;
            }
            DateTime::from_timestamp(v as i64, 0)
        }
        Value::String(s) => parse_timestamp_text(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if is_numeric(text) {
        let mut v = text.parse::<f64>().ok()?;
        if text.len() >= 13 {
            v /= 1000.0;
        }
        return DateTime::from_timestamp(v as i64, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Bare `YYYY-MM-DD...` without a parseable time still dates the record.
    let bytes = text.as_bytes();
    if bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        let date = NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()?;
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn is_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Buckets a timestamp by the machine's local calendar: date key, hour of
/// day, and day of week with Monday as zero.
fn local_date_parts(ts: DateTime<Utc>) -> (String, u32, u32) {
    let local = ts.with_timezone(&Local);
    (
        local.format("%Y-%m-%d").to_string(),
        local.hour(),
        local.weekday().num_days_from_monday(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<UsageRecord> {
        parse_line("agent", line)
    }

    #[test]
    fn skips_non_json_and_non_object_lines() {
        assert!(parse("not json").is_none());
        assert!(parse("[1, 2, 3]").is_none());
        assert!(parse("42").is_none());
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
    }

    #[test]
    fn skips_lines_without_positive_tokens() {
        assert!(parse(r#"{"message": {"role": "user"}}"#).is_none());
        assert!(parse(r#"{"usage": {"totalTokens": 0}}"#).is_none());
        assert!(parse(r#"{"usage": {"totalTokens": -5}}"#).is_none());
        assert!(parse(r#"{"usage": "not an object"}"#).is_none());
    }

    #[test]
    fn reads_total_from_first_matching_alias() {
        let rec = parse(r#"{"usage": {"total_tokens": 120}}"#).unwrap();
        assert_eq!(rec.tokens, 120);
        // totalTokens outranks total_tokens.
        let rec = parse(r#"{"usage": {"totalTokens": 7, "total_tokens": 120}}"#).unwrap();
        assert_eq!(rec.tokens, 7);
    }

    #[test]
    fn non_positive_total_falls_through_to_next_alias() {
        let rec = parse(r#"{"usage": {"totalTokens": 0, "tokens": 9}}"#).unwrap();
        assert_eq!(rec.tokens, 9);
    }

    #[test]
    fn sums_components_when_no_total_present() {
        let rec = parse(
            r#"{"usage": {"input_tokens": 100, "output_tokens": 25, "cache_read_input_tokens": 10}}"#,
        )
        .unwrap();
        assert_eq!(rec.tokens, 135);
    }

    #[test]
    fn negative_components_do_not_reduce_the_sum() {
        let rec = parse(r#"{"usage": {"input": 50, "output": -10}}"#).unwrap();
        assert_eq!(rec.tokens, 50);
    }

    #[test]
    fn coerces_string_and_float_counts() {
        let rec = parse(r#"{"usage": {"totalTokens": "  250 "}}"#).unwrap();
        assert_eq!(rec.tokens, 250);
        let rec = parse(r#"{"usage": {"totalTokens": 99.9}}"#).unwrap();
        assert_eq!(rec.tokens, 99);
    }

    #[test]
    fn message_usage_outranks_top_level_usage() {
        let rec = parse(
            r#"{"usage": {"totalTokens": 5}, "message": {"usage": {"totalTokens": 11}}}"#,
        )
        .unwrap();
        assert_eq!(rec.tokens, 11);
    }

    #[test]
    fn non_object_message_usage_falls_back_to_top_level() {
        let rec =
            parse(r#"{"usage": {"totalTokens": 5}, "message": {"usage": 12}}"#).unwrap();
        assert_eq!(rec.tokens, 5);
    }

    #[test]
    fn model_prefers_message_scope_and_trims() {
        let rec = parse(
            r#"{"model": "outer", "message": {"model": "  inner  ", "usage": {"tokens": 1}}}"#,
        )
        .unwrap();
        assert_eq!(rec.model, "inner");
    }

    #[test]
    fn blank_model_falls_back_to_unknown() {
        let rec = parse(r#"{"model": "   ", "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.model, "unknown");
        let rec = parse(r#"{"usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.model, "unknown");
    }

    #[test]
    fn model_id_aliases_are_honored() {
        let rec = parse(r#"{"modelId": "gpt-x", "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.model, "gpt-x");
        let rec = parse(r#"{"model_id": "gpt-y", "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.model, "gpt-y");
    }

    #[test]
    fn cost_prefers_top_level_cost_usd() {
        let rec = parse(
            r#"{"costUsd": 0.25, "usage": {"tokens": 1, "cost": 0.9}}"#,
        )
        .unwrap();
        assert_eq!(rec.cost, 0.25);
    }

    #[test]
    fn cost_falls_back_to_usage_cost_then_nested_total() {
        let rec = parse(r#"{"usage": {"tokens": 1, "cost": 0.125}}"#).unwrap();
        assert_eq!(rec.cost, 0.125);
        let rec = parse(r#"{"usage": {"tokens": 1, "cost": {"total": 0.5}}}"#).unwrap();
        assert_eq!(rec.cost, 0.5);
        let rec = parse(r#"{"usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.cost, 0.0);
    }

    #[test]
    fn rfc3339_timestamp_sets_date_and_clock_fields() {
        let rec = parse(
            r#"{"timestamp": "2026-03-14T12:30:00Z", "usage": {"tokens": 1}}"#,
        )
        .unwrap();
        assert_ne!(rec.date_key, UNKNOWN_DATE_KEY);
        assert!(rec.hour.is_some());
        assert!(rec.dow.is_some());
        assert!(rec.dow.unwrap() < 7);
        assert!(rec.hour.unwrap() < 24);
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let secs = parse(r#"{"timestamp": 1770000000, "usage": {"tokens": 1}}"#).unwrap();
        let millis = parse(r#"{"timestamp": 1770000000000, "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(secs.date_key, millis.date_key);
        assert_eq!(secs.hour, millis.hour);
    }

    #[test]
    fn iso_and_epoch_forms_of_one_instant_share_a_date_key() {
        // 1773491400 is 2026-03-14T12:30:00Z.
        let iso = parse(r#"{"timestamp": "2026-03-14T12:30:00Z", "usage": {"tokens": 1}}"#).unwrap();
        let secs = parse(r#"{"timestamp": 1773491400, "usage": {"tokens": 1}}"#).unwrap();
        let millis = parse(r#"{"timestamp": 1773491400000, "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(iso.date_key, secs.date_key);
        assert_eq!(iso.hour, secs.hour);
        assert_eq!(iso.dow, secs.dow);
        assert_eq!(iso.date_key, millis.date_key);
        assert_eq!(iso.hour, millis.hour);
    }

    #[test]
    fn numeric_string_timestamps_parse_like_numbers() {
        let num = parse(r#"{"timestamp": 1770000000, "usage": {"tokens": 1}}"#).unwrap();
        let text = parse(r#"{"timestamp": "1770000000", "usage": {"tokens": 1}}"#).unwrap();
        let millis = parse(r#"{"timestamp": "1770000000000", "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(num.date_key, text.date_key);
        assert_eq!(num.date_key, millis.date_key);
    }

    #[test]
    fn bare_date_prefix_still_dates_the_record() {
        let rec = parse(
            r#"{"timestamp": "2026-03-14 someday", "usage": {"tokens": 1}}"#,
        )
        .unwrap();
        assert_ne!(rec.date_key, UNKNOWN_DATE_KEY);
        assert!(rec.hour.is_some());
    }

    #[test]
    fn message_timestamp_is_a_fallback() {
        let rec = parse(
            r#"{"message": {"timestamp": "2026-01-02T00:00:00Z", "usage": {"tokens": 1}}}"#,
        )
        .unwrap();
        assert_ne!(rec.date_key, UNKNOWN_DATE_KEY);
    }

    #[test]
    fn garbage_timestamp_lands_in_unknown_bucket() {
        let rec = parse(r#"{"timestamp": "tuesday-ish", "usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(rec.date_key, UNKNOWN_DATE_KEY);
        assert_eq!(rec.hour, None);
        assert_eq!(rec.dow, None);
    }

    #[test]
    fn hour_and_dow_are_present_or_absent_together() {
        let dated = parse(
            r#"{"timestamp": "2026-03-14T09:00:00+02:00", "usage": {"tokens": 1}}"#,
        )
        .unwrap();
        assert_eq!(dated.hour.is_some(), dated.dow.is_some());
        let undated = parse(r#"{"usage": {"tokens": 1}}"#).unwrap();
        assert_eq!(undated.hour, None);
        assert_eq!(undated.dow, None);
    }

    #[test]
    fn agent_name_is_carried_through() {
        let rec = parse_line("research-bot", r#"{"usage": {"tokens": 3}}"#).unwrap();
        assert_eq!(rec.agent_name, "research-bot");
    }
}
