//! Time utilities.
//!
//! All timestamps in the pipeline are UNIX seconds in UTC. History shards are
//! bucketed by the Monday 00:00:00 UTC that starts the week containing the
//! snapshot instant; local-time inputs are not accepted anywhere.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_WEEK: i64 = 7 * SECS_PER_DAY;

/// Current time as **seconds** since Unix epoch.
#[inline]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Convert UNIX seconds to a UTC instant. Out-of-range values clamp to epoch.
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Interpret an upstream `lastModified` (milliseconds) as UNIX seconds.
#[inline]
pub fn millis_to_unix(millis: i64) -> i64 {
    millis.div_euclid(1000)
}

/// Start of the UTC week (Monday 00:00:00) containing `at`.
pub fn week_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = i64::from(at.weekday().num_days_from_monday());
    let midnight = at.date_naive().and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()).unwrap_or(at);
    midnight - Duration::days(days_from_monday)
}

/// [`week_start`] over UNIX seconds.
pub fn week_start_unix(secs: i64) -> i64 {
    week_start(from_unix(secs)).timestamp()
}

/// Retention horizon: anything stamped before `now - weeks` has expired.
///
/// A history shard survives while its `week_start` is at or after this
/// instant, a raw snapshot while its timestamp is.
pub fn retention_cutoff(now: i64, weeks: u32) -> i64 {
    now.saturating_sub(i64::from(weeks).saturating_mul(SECS_PER_WEEK))
}
