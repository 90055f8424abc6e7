//! Calendar helpers for cache keys and retention cutoffs

use crate::record::Resolution;
use chrono::{DateTime, Datelike, Months, NaiveDate};

/// Calendar date a cache key refers to; monthly keys map to the 1st
pub(crate) fn key_date(resolution: Resolution, key: &str) -> Option<NaiveDate> {
    match resolution {
        Resolution::Hourly => DateTime::parse_from_rfc3339(key)
            .ok()
            .map(|ts| ts.date_naive()),
        Resolution::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d").ok(),
        Resolution::Monthly => NaiveDate::parse_from_str(&format!("{}-01", key), "%Y-%m-%d").ok(),
    }
}

/// Date rendered at the granularity used in metadata ranges
pub(crate) fn format_range_date(resolution: Resolution, date: NaiveDate) -> String {
    match resolution {
        Resolution::Monthly => date.format("%Y-%m").to_string(),
        Resolution::Hourly | Resolution::Daily => date.format("%Y-%m-%d").to_string(),
    }
}

pub(crate) fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the month `months` before the month containing `date`
pub(crate) fn months_back(date: NaiveDate, months: u32) -> NaiveDate {
    let start = month_start(date);
    start
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// First day of the month after the one containing `date`
pub(crate) fn next_month(date: NaiveDate) -> NaiveDate {
    let start = month_start(date);
    start
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

/// Oldest date a record may carry after pruning `resolution` with `window`
pub(crate) fn retention_cutoff(resolution: Resolution, today: NaiveDate, window: u32) -> NaiveDate {
    match resolution {
        Resolution::Hourly | Resolution::Daily => today
            .checked_sub_days(chrono::Days::new(u64::from(window)))
            .unwrap_or(NaiveDate::MIN),
        Resolution::Monthly => months_back(today, window),
    }
}
