use crate::error::{Error, SyncResult};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use chrono_tz::Tz;

/// Layouts accepted for timestamps that carry no offset
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Resolve a zone name, falling back when missing or unknown
pub fn resolve_zone(name: Option<&str>, fallback: Tz) -> Tz {
    name.and_then(|n| n.parse::<Tz>().ok()).unwrap_or(fallback)
}

/// Attach a zone to a wall-clock time
pub fn localize(naive: &NaiveDateTime, zone: Tz) -> SyncResult<DateTime<FixedOffset>> {
    match zone.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt.fixed_offset()),
        // Repeated hour at a DST change: take the first occurrence
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.fixed_offset()),
        LocalResult::None => Err(Error::InvalidEvent(format!(
            "{} does not exist in {}",
            naive, zone
        ))),
    }
}

/// Parse a timestamp as sent by the remote store.
///
/// Values with an explicit offset are taken as-is; naive values are read as
/// wall-clock time in `zone`.
pub fn parse_remote_timestamp(value: &str, zone: Tz) -> SyncResult<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return localize(&naive, zone);
        }
    }

    Err(Error::Serialization(format!("Unrecognised timestamp: {}", value)))
}

/// Parse an all-day date as midnight in `zone`
pub fn parse_remote_date(value: &str, zone: Tz) -> SyncResult<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Serialization(format!("Failed to parse date {}: {}", value, e)))?;
    localize(&date.and_time(NaiveTime::MIN), zone)
}

/// Format a timestamp the way the remote store expects it, expressed in `zone`
pub fn format_remote_timestamp(dt: &DateTime<FixedOffset>, zone: Tz) -> String {
    dt.with_timezone(&zone)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

/// Longest DST gap we step across when looking for a valid wall-clock time
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Nearest existing wall-clock time to `naive`, searching by whole minutes
/// forwards (`step` = 1) or backwards (`step` = -1)
fn nearest_valid(naive: NaiveDateTime, zone: Tz, step: i64) -> SyncResult<DateTime<FixedOffset>> {
    for minutes in 0..=MAX_GAP_MINUTES {
        let candidate = naive + Duration::minutes(minutes * step);
        match zone.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Ok(dt.fixed_offset()),
            LocalResult::Ambiguous(earliest, latest) => {
                let dt = if step > 0 { earliest } else { latest };
                return Ok(dt.fixed_offset());
            }
            LocalResult::None => continue,
        }
    }
    Err(Error::InvalidEvent(format!("{} does not exist in {}", naive, zone)))
}

/// First and last second of a calendar day in `zone`.
///
/// When midnight (or 23:59:59) is skipped by a DST change, the window starts at
/// the first (or ends at the last) wall-clock time that exists that day.
pub fn day_window(
    date: NaiveDate,
    zone: Tz,
) -> SyncResult<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let start = nearest_valid(date.and_time(NaiveTime::MIN), zone, 1)?;
    let last_second = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| Error::Other("Failed to build end of day".to_string()))?;
    let end = nearest_valid(date.and_time(last_second), zone, -1)?;
    Ok((start, end))
}
