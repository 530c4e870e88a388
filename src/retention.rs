// SPDX-License-Identifier: EUPL-1.2

//! Date input handling and removal of old reports.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::db::ReportRepository;
use crate::error::{ReportsError, Result};

/// Days of reports kept when no date is given.
pub const DEFAULT_OFFSET_DAYS: i64 = 7;

fn date_shape() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

/// Midnight of `date` in `tz`, as UTC.
///
/// When midnight does not exist (DST gap) the first instant of the day is used.
fn midnight_in<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => (1..=3)
            .filter_map(|h| date.and_hms_opt(h, 0, 0))
            .find_map(|later| tz.from_local_datetime(&later).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

/// Parse a `YYYY-MM-DD` date as midnight in the timezone of `tz`.
pub fn parse_date_input<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>> {
    let invalid = || ReportsError::InvalidDate(value.to_string());
    if !date_shape().is_match(value) {
        return Err(invalid());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    Ok(midnight_in(tz, date))
}

/// Start of the day containing `now`, in `now`'s timezone.
pub fn local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    midnight_in(&now.timezone(), now.date_naive())
}

/// Resolve a date input, falling back to `offset_days` before today's midnight.
pub fn date_or_offset<Tz: TimeZone>(
    value: Option<&str>,
    now: &DateTime<Tz>,
    offset_days: i64,
) -> Result<DateTime<Utc>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_date_input(value, &now.timezone()),
        None => Ok(local_midnight(now) - Duration::days(offset_days)),
    }
}

/// Reports created before the returned instant are removed by [`clean`].
pub fn cleanup_cutoff<Tz: TimeZone>(value: Option<&str>, now: &DateTime<Tz>) -> Result<DateTime<Utc>> {
    date_or_offset(value, now, DEFAULT_OFFSET_DAYS)
}

/// Delete reports created before `cutoff`. Returns the count.
pub async fn delete_before(repository: &dyn ReportRepository, cutoff: DateTime<Utc>) -> Result<u64> {
    let deleted = repository.delete_created_before(cutoff).await?;
    tracing::info!(%cutoff, deleted, "Deleted old CSP reports");
    Ok(deleted)
}

/// Delete reports older than the cutoff. Returns the cutoff and the count.
pub async fn clean<Tz: TimeZone>(
    repository: &dyn ReportRepository,
    value: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<(DateTime<Utc>, u64)> {
    let cutoff = cleanup_cutoff(value, now)?;
    let deleted = delete_before(repository, cutoff).await?;
    Ok((cutoff, deleted))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
