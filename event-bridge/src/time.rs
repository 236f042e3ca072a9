//! Small time helpers. Raw events carry a capture-time in unix millis;
//! everything we emit is RFC 3339.

/// Current unix time in milliseconds.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Format a unix-millisecond timestamp as RFC 3339. Returns `None` for
/// values outside the representable range.
pub fn ms_to_rfc3339(ms: i64) -> Option<String> {
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()?;
    ts.format(&time::format_description::well_known::Rfc3339)
        .ok()
}

/// Current time as RFC 3339.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("failed to format timestamp")
}
