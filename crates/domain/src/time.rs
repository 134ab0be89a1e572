use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::TradingError;

/// Parses a Go-style duration string: an integer count followed by a unit
/// (`ms`, `s`, `m`, `h`), with compound forms like `"1h30m"` allowed.
pub fn parse_duration(s: &str) -> Result<Duration, TradingError> {
    let trimmed = s.trim();
    let bytes = trimmed.as_bytes();
    if bytes.is_empty() {
        return Err(TradingError::DurationFormat(s.to_string()));
    }
    let mut total = Duration::zero();
    let mut i = 0;
    while i < bytes.len() {
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let value: i64 = trimmed[digits_start..i]
            .parse()
            .map_err(|_| TradingError::DurationFormat(s.to_string()))?;
        let unit_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_digit() {
            i += 1;
        }
        total = total
            + match &trimmed[unit_start..i] {
                "ms" => Duration::milliseconds(value),
                "s" => Duration::seconds(value),
                "m" => Duration::minutes(value),
                "h" => Duration::hours(value),
                _ => return Err(TradingError::DurationFormat(s.to_string())),
            };
    }
    Ok(total)
}

/// Rounds `time` down to a multiple of `interval` since the Unix epoch.
pub fn truncate(time: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let interval_ms = interval.num_milliseconds();
    if interval_ms <= 0 {
        return time;
    }
    let ts = time.timestamp_millis();
    let truncated = ts - ts.rem_euclid(interval_ms);
    Utc.timestamp_millis_opt(truncated).single().unwrap_or(time)
}

/// The first interval boundary strictly after `time`.
pub fn next_boundary(time: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    truncate(time, interval) + interval
}
