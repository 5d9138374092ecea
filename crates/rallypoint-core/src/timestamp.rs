//! Timestamp normalisation for backend `created_at` strings.
//!
//! The backend is not consistent about how it renders timestamps. Depending
//! on the route and server version a report may carry:
//!
//! - RFC 3339: `2026-02-21T10:00:00Z`, `2026-02-21T13:00:00+03:00`
//! - naive SQL style: `2026-02-21 10:00:00` (optionally with fractional seconds)
//! - naive ISO style: `2026-02-21T10:00:00`
//! - HTTP date (RFC 2822): `Sat, 21 Feb 2026 10:00:00 GMT`
//!
//! Naive forms carry no offset. The backend writes them from its own local
//! clock, so they are read in the backend's configured UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse a backend timestamp into UTC. Returns `None` for blank or
/// unrecognised input.
///
/// Timestamps without a zone are interpreted in `naive_offset`.
pub fn parse_timestamp(raw: &str, naive_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| naive_offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole minutes between `created_at` and `now`, floored.
///
/// `floor((now - created_at) / 60000 ms)`. A timestamp in the future yields a
/// negative value.
pub fn minutes_elapsed(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_milliseconds().div_euclid(60_000)
}
