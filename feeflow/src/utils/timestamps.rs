//! Timestamp helpers for log lines and status records.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Default log line date format, `YYYY-MM-DD HH:mm:ss Z`.
pub const DEFAULT_LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// Returns true if `format` is a strftime pattern chrono can render.
#[must_use]
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Renders a timestamp for a log line prefix in the given zone.
///
/// The format must already have passed [`is_valid_date_format`]; chrono
/// panics while rendering invalid patterns.
#[must_use]
pub fn format_log_timestamp<Tz>(ts: &Timestamp, tz: &Tz, format: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format(format).to_string()
}

/// Renders a timestamp in the host's local zone.
#[must_use]
pub fn format_local(ts: &Timestamp, format: &str) -> String {
    format_log_timestamp(ts, &Local, format)
}
