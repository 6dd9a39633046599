// src/ingest/dates.rs
//! Date parsing for feed timestamps and the recency window.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let from_time = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()));
    // chrono is more lenient with obsolete zone names ("EST", "Z").
    from_time.or_else(|| {
        DateTime::parse_from_rfc2822(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Parse any date shape seen in release/RSS/Atom feeds.
/// Returns `None` instead of guessing; callers must not substitute "now".
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_rfc2822(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Configurable cutoff; `None` days means no date filter at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecencyWindow {
    pub days: Option<u32>,
}

impl RecencyWindow {
    pub fn days(days: u32) -> Self {
        Self { days: Some(days) }
    }

    pub fn disabled() -> Self {
        Self { days: None }
    }

    /// Oldest accepted timestamp relative to `now`, if the window is active.
    /// A window reaching past chrono's range saturates at the earliest instant.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days.map(|d| {
            ChronoDuration::try_days(i64::from(d))
                .and_then(|span| now.checked_sub_signed(span))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }
}

/// Korean long date, e.g. `2024년 1월 1일`.
pub fn format_korean_date(dt: &DateTime<Utc>) -> String {
    format!("{}년 {}월 {}일", dt.year(), dt.month(), dt.day())
}
