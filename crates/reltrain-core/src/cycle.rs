//! Weekly cycle arithmetic. Cycles start on Monday; a Monday is its own cycle start.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};

/// Days elapsed since the most recent Monday (0 on a Monday).
pub fn days_since_cycle_start(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_monday())
}

/// The Monday on or before `date`.
pub fn cycle_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(days_since_cycle_start(date))
}

/// `prefix` + `YYYYMMDD` of the cycle start.
pub fn release_branch_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}{}", cycle_start(date).format("%Y%m%d"))
}

/// Lookback length: back to the cycle start and one day past it.
pub fn lookback_days(date: NaiveDate) -> i64 {
    1 + days_since_cycle_start(date)
}

/// `[now - lookback, now]`.
pub fn lookback_window(now: DateTime<FixedOffset>) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let days = lookback_days(now.date_naive());
    (now - Duration::days(days), now)
}
