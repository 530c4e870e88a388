// SPDX-License-Identifier: EUPL-1.2

//! Maintenance commands behind the `clean` and `summarize` subcommands.
//!
//! Storage is handed in as an opener and only called once every date
//! argument has been parsed, so bad input never touches the database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;

use crate::db::ReportRepository;
use crate::error::Result;
use crate::retention;
use crate::summary::{self, Summary};

/// Delete reports created before `limit` (default: a week before today's
/// midnight). Returns the cutoff and the number of deleted reports.
pub async fn clean<Tz, F, Fut>(
    limit: Option<&str>,
    now: &DateTime<Tz>,
    open: F,
) -> Result<(DateTime<Utc>, u64)>
where
    Tz: TimeZone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn ReportRepository>>>,
{
    let cutoff = retention::cleanup_cutoff(limit, now)?;
    let repository = open().await?;
    let deleted = retention::delete_before(repository.as_ref(), cutoff).await?;
    Ok((cutoff, deleted))
}

/// Summarize the days `since..=to`. Both default to yesterday.
pub async fn summarize<Tz, F, Fut>(
    since: Option<&str>,
    to: Option<&str>,
    top: usize,
    now: &DateTime<Tz>,
    open: F,
) -> Result<Summary>
where
    Tz: TimeZone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn ReportRepository>>>,
{
    let since = retention::date_or_offset(since, now, 1)?;
    let to = retention::date_or_offset(to, now, 1)? + Duration::days(1);
    let repository = open().await?;
    summary::collect(repository.as_ref(), since, to, top).await
}
