//! Timestamp parsing, truncation and canonical formatting.

use time::{Duration, OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use time::macros::format_description;

/// Parse an RFC 3339 instant and convert it to UTC.
pub fn parse_instant(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .ok()
        .map(|parsed| parsed.to_offset(UtcOffset::UTC))
}

/// Drop seconds and sub-second precision.
pub fn floor_to_minute(value: OffsetDateTime) -> OffsetDateTime {
    value
        - Duration::seconds(i64::from(value.second()))
        - Duration::nanoseconds(i64::from(value.nanosecond()))
}

/// Drop minutes, seconds and sub-second precision.
pub fn floor_to_hour(value: OffsetDateTime) -> OffsetDateTime {
    floor_to_minute(value) - Duration::minutes(i64::from(value.minute()))
}

/// Format as `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC.
pub fn format_iso_millis(value: OffsetDateTime) -> String {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .expect("formatting a UTC timestamp should succeed")
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis(value: OffsetDateTime) -> i64 {
    i64::try_from(value.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
