use chrono::{DateTime, Datelike, Days, Utc};
use std::fmt;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// ISO week the cache belongs to; a different week invalidates everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEpoch(String);

impl CacheEpoch {
    pub fn for_time(at: DateTime<Utc>) -> Self {
        let week = at.iso_week();
        CacheEpoch(format!("{}-W{:02}", week.year(), week.week()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheEpoch {
    fn from(value: &str) -> Self {
        CacheEpoch(value.to_string())
    }
}

/// Next Monday at 08:30 CET expressed as 06:30 UTC (fixed offset, no DST).
/// On a Monday this is the Monday of the following week.
pub fn next_monday_departure(now: DateTime<Utc>) -> DateTime<Utc> {
    let from_sunday = u64::from(now.weekday().num_days_from_sunday());
    let days = match (8 - from_sunday) % 7 {
        0 => 7,
        days => days,
    };
    let date = now.date_naive() + Days::new(days);
    date.and_hms_opt(6, 30, 0).unwrap_or_default().and_utc()
}
