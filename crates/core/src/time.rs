//! Nanosecond timestamp helpers.
//!
//! All message timestamps are `i64` nanoseconds since the Unix epoch.
//! Configuration expresses durations in (fractional) seconds.

use chrono::{DateTime, SecondsFormat, Utc};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert fractional seconds to nanoseconds, saturating at the `i64` range.
pub fn secs_to_nanos(secs: f64) -> i64 {
  let nanos = secs * NANOS_PER_SEC as f64;
  if nanos >= i64::MAX as f64 {
    i64::MAX
  } else if nanos <= i64::MIN as f64 {
    i64::MIN
  } else {
    nanos.round() as i64
  }
}

pub fn nanos_to_secs(nanos: i64) -> f64 {
  nanos as f64 / NANOS_PER_SEC as f64
}

/// Wall-clock time in nanoseconds.
pub fn now_nanos() -> i64 {
  Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub fn from_datetime(dt: DateTime<Utc>) -> i64 {
  dt.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// RFC 3339 rendering for logs and CLI output.
pub fn format_nanos(nanos: i64) -> String {
  DateTime::<Utc>::from_timestamp_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse either an integer nanosecond timestamp or an RFC 3339 string.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
  if let Ok(nanos) = raw.parse::<i64>() {
    return Some(nanos);
  }
  DateTime::parse_from_rfc3339(raw)
    .ok()
    .and_then(|dt| dt.with_timezone(&Utc).timestamp_nanos_opt())
}
