use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::domain::TimeRange;
use crate::error::{QueryError, QueryResult};

/// Half-open `[start, end)` interval; a missing bound is unbounded on that side.
///
/// Bounds and timestamps are compared at millisecond precision, the resolution
/// of the analytical store's `DateTime64(3)` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let ts_ms = ts.timestamp_millis();
        self.start_unix_ms().map_or(true, |start| ts_ms >= start)
            && self.end_unix_ms().map_or(true, |end| ts_ms < end)
    }

    pub fn is_empty(&self) -> bool {
        matches!(
            (self.start_unix_ms(), self.end_unix_ms()),
            (Some(start), Some(end)) if start >= end
        )
    }

    pub fn start_unix_ms(&self) -> Option<i64> {
        self.start.map(|ts| ts.timestamp_millis())
    }

    pub fn end_unix_ms(&self) -> Option<i64> {
        self.end.map(|ts| ts.timestamp_millis())
    }
}

fn stats_period_re() -> &'static Regex {
    static PERIOD_RE: OnceLock<Regex> = OnceLock::new();
    PERIOD_RE.get_or_init(|| Regex::new(r"^(\d+)([smhdw]?)$").expect("valid period regex"))
}

/// Parses `30m`, `24h`, `14d`, `2w`; a bare number is seconds.
pub fn parse_stats_period(raw: &str) -> QueryResult<Duration> {
    let invalid = || QueryError::invalid_argument(format!("invalid stats period: {raw:?}"));

    let caps = stats_period_re().captures(raw.trim()).ok_or_else(invalid)?;
    let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_seconds: i64 = match &caps[2] {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    amount
        .checked_mul(unit_seconds)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

/// Resolves the caller's range against `now` and clamps it to the retention horizon.
///
/// A period wins over explicit bounds and leaves the end open. With
/// `retention_days > 0` the start never falls before `now - retention_days`.
pub fn resolve_window(
    range: &TimeRange,
    now: DateTime<Utc>,
    retention_days: u32,
) -> QueryResult<TimeWindow> {
    let period = range
        .period
        .as_deref()
        .map(str::trim)
        .filter(|period| !period.is_empty());

    let window = match period {
        Some(period) => {
            let duration = parse_stats_period(period)?;
            TimeWindow {
                start: now.checked_sub_signed(duration),
                end: None,
            }
        }
        None => TimeWindow {
            start: range.start,
            end: range.end,
        },
    };

    Ok(clamp_to_retention(window, now, retention_days))
}

pub fn clamp_to_retention(
    window: TimeWindow,
    now: DateTime<Utc>,
    retention_days: u32,
) -> TimeWindow {
    if retention_days == 0 {
        return window;
    }
    let Some(floor) = now.checked_sub_signed(Duration::days(i64::from(retention_days))) else {
        return window;
    };

    TimeWindow {
        start: Some(window.start.map_or(floor, |start| start.max(floor))),
        end: window.end,
    }
}
