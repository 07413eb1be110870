//! Schedule parsing and next occurrence calculation.
//!
//! Supports a closed set of 5-field cron shapes (daily, hourly, weekly,
//! monthly) plus the literal `"now"` for one-shot tasks. Each recognized
//! shape maps to a concrete next-run timestamp and a fixed repeat period.
//! Anything else is a hard parse error surfaced to the caller.

use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal schedule value that runs a task immediately, exactly once.
pub const SCHEDULE_NOW: &str = "now";

/// Errors that can occur when parsing schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Wrong number of cron fields.
    #[error("expected 5 cron fields, got {0}")]
    FieldCount(usize),

    /// A field value is out of range or not a number.
    #[error("invalid cron field {field}: {value}")]
    InvalidField {
        /// Field name (minute, hour, day-of-month, month, day-of-week).
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// The expression is valid cron syntax but not one of the supported shapes.
    #[error("unsupported cron pattern: {0}")]
    Unsupported(String),
}

/// Kind of schedule, derived from the expression shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Runs once, immediately (`"now"`).
    Once,
    /// `m * * * *`: every hour at minute m.
    Hourly,
    /// `m h * * *`: every day at h:m.
    Daily,
    /// `m h * * d`: every week on weekday d at h:m.
    Weekly,
    /// `m h D * *`: every month on day-of-month D at h:m.
    Monthly,
}

impl ScheduleKind {
    /// Stable string form (used by storage backends).
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Once => "once",
            ScheduleKind::Hourly => "hourly",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::Monthly => "monthly",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "once" => Some(ScheduleKind::Once),
            "hourly" => Some(ScheduleKind::Hourly),
            "daily" => Some(ScheduleKind::Daily),
            "weekly" => Some(ScheduleKind::Weekly),
            "monthly" => Some(ScheduleKind::Monthly),
            _ => None,
        }
    }
}

/// Result of evaluating a schedule expression at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSpec {
    /// First occurrence, strictly in the future (or `now` for one-shots).
    pub next_run: DateTime<Utc>,
    /// Repeat period in milliseconds; 0 for one-shot schedules.
    pub period_ms: i64,
    /// Derived schedule kind.
    pub kind: ScheduleKind,
}

/// A single cron field: either `*` or a concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    Value(u32),
}

/// Parse a schedule expression relative to `now`.
///
/// The literal `"now"` bypasses cron parsing entirely and yields a one-shot
/// spec due immediately. For the cron shapes, the computed occurrence is
/// rolled forward by one period whenever it would land at or before `now`.
pub fn parse_schedule(expr: &str, now: DateTime<Utc>) -> Result<ScheduleSpec, ScheduleError> {
    let trimmed = expr.trim();

    if trimmed.eq_ignore_ascii_case(SCHEDULE_NOW) {
        return Ok(ScheduleSpec {
            next_run: now,
            period_ms: 0,
            kind: ScheduleKind::Once,
        });
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::FieldCount(fields.len()));
    }

    let minute = parse_field(fields[0], "minute", 0, 59)?;
    let hour = parse_field(fields[1], "hour", 0, 23)?;
    let dom = parse_field(fields[2], "day-of-month", 1, 31)?;
    let month = parse_field(fields[3], "month", 1, 12)?;
    let dow = parse_field(fields[4], "day-of-week", 0, 7)?;

    match (minute, hour, dom, month, dow) {
        // m h * * *: daily at h:m
        (Field::Value(m), Field::Value(h), Field::Any, Field::Any, Field::Any) => {
            Ok(ScheduleSpec {
                next_run: daily_next(now, m, h),
                period_ms: Duration::days(1).num_milliseconds(),
                kind: ScheduleKind::Daily,
            })
        }
        // m * * * *: hourly at minute m
        (Field::Value(m), Field::Any, Field::Any, Field::Any, Field::Any) => Ok(ScheduleSpec {
            next_run: hourly_next(now, m),
            period_ms: Duration::hours(1).num_milliseconds(),
            kind: ScheduleKind::Hourly,
        }),
        // m h * * d: weekly on weekday d at h:m
        (Field::Value(m), Field::Value(h), Field::Any, Field::Any, Field::Value(d)) => {
            Ok(ScheduleSpec {
                next_run: weekly_next(now, m, h, d % 7),
                period_ms: Duration::weeks(1).num_milliseconds(),
                kind: ScheduleKind::Weekly,
            })
        }
        // m h D * *: monthly on day-of-month D at h:m
        (Field::Value(m), Field::Value(h), Field::Value(d), Field::Any, Field::Any) => {
            Ok(ScheduleSpec {
                next_run: monthly_next(now, m, h, d),
                period_ms: Duration::days(30).num_milliseconds(),
                kind: ScheduleKind::Monthly,
            })
        }
        _ => Err(ScheduleError::Unsupported(trimmed.to_string())),
    }
}

/// Parse one cron field: `*` or an integer within `[min, max]`.
fn parse_field(
    raw: &str,
    name: &'static str,
    min: u32,
    max: u32,
) -> Result<Field, ScheduleError> {
    if raw == "*" {
        return Ok(Field::Any);
    }
    let value: u32 = raw.parse().map_err(|_| ScheduleError::InvalidField {
        field: name,
        value: raw.to_string(),
    })?;
    if value < min || value > max {
        return Err(ScheduleError::InvalidField {
            field: name,
            value: raw.to_string(),
        });
    }
    Ok(Field::Value(value))
}

/// Next occurrence of minute `m` after `now` (wraps to the next hour).
fn hourly_next(now: DateTime<Utc>, minute: u32) -> DateTime<Utc> {
    let candidate = now
        .with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if candidate <= now {
        candidate + Duration::hours(1)
    } else {
        candidate
    }
}

/// Next occurrence of `h:m` after `now` (wraps to the next day).
fn daily_next(now: DateTime<Utc>, minute: u32, hour: u32) -> DateTime<Utc> {
    let candidate = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    if candidate <= now {
        candidate + Duration::days(1)
    } else {
        candidate
    }
}

/// Next occurrence of weekday `dow` (0 = Sunday) at `h:m` after `now`.
fn weekly_next(now: DateTime<Utc>, minute: u32, hour: u32, dow: u32) -> DateTime<Utc> {
    let today = now.weekday().num_days_from_sunday();
    let days_ahead = (dow + 7 - today) % 7;
    let candidate = (now.date_naive() + Duration::days(i64::from(days_ahead)))
        .and_hms_opt(hour, minute, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    if candidate <= now {
        candidate + Duration::weeks(1)
    } else {
        candidate
    }
}

/// Next occurrence of day-of-month `dom` at `h:m` after `now`.
///
/// Months without the requested day (e.g. the 31st in February) are
/// skipped entirely rather than clamped.
fn monthly_next(now: DateTime<Utc>, minute: u32, hour: u32, dom: u32) -> DateTime<Utc> {
    let mut cursor = match now.date_naive().with_day(1) {
        Some(first) => first,
        None => return now + Duration::days(30),
    };
    // Every day 1..=31 occurs at least once within any 24-month window.
    for _ in 0..24 {
        if let Some(candidate) = cursor
            .with_day(dom)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(|t| t.and_utc())
        {
            if candidate > now {
                return candidate;
            }
        }
        cursor = cursor + Months::new(1);
    }
    now + Duration::days(30)
}
