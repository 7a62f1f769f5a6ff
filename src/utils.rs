use crate::error::AppError;
use chrono::{Local, TimeZone, Utc};

pub const SECS_PER_DAY: i64 = 86_400;

/// Start of the UTC day containing `ts`.
pub fn sod(ts: i64) -> i64 {
    ts - ts.rem_euclid(SECS_PER_DAY)
}

/// Start of the local day containing `ts`, for a fixed offset in seconds.
pub fn sod_local(ts: i64, offset_secs: i64) -> i64 {
    sod(ts + offset_secs) - offset_secs
}

pub fn timezone_offset() -> chrono::Duration {
    let local_time = Local::now();
    let utc_time = local_time.with_timezone(&Utc);
    local_time.naive_local() - utc_time.naive_utc()
}

/// Resolve a `"+HH:MM"` / `"-HH:MM"` offset string; `None` falls back to the
/// system local offset.
pub fn resolve_tz_offset(tz: Option<&str>) -> Result<i64, AppError> {
    match tz {
        None => Ok(timezone_offset().num_seconds()),
        Some(s) => {
            let (sign, rest) = match s.as_bytes().first() {
                Some(b'+') => (1, &s[1..]),
                Some(b'-') => (-1, &s[1..]),
                _ => return Err(AppError::config(format!("invalid timezone offset '{}'", s))),
            };
            let secs = parse_hhmm(rest)
                .map_err(|_| AppError::config(format!("invalid timezone offset '{}'", s)))?;
            Ok(sign * secs)
        }
    }
}

/// Parse a 24-hour `HH:MM` string into seconds of day.
pub fn parse_hhmm(s: &str) -> Result<i64, AppError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| AppError::config(format!("invalid time '{}', expected HH:MM", s)))?;
    let hours: i64 = h.parse().map_err(|_| AppError::config(format!("invalid hour in '{}'", s)))?;
    let minutes: i64 =
        m.parse().map_err(|_| AppError::config(format!("invalid minute in '{}'", s)))?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(AppError::config(format!("time '{}' out of range", s)));
    }
    Ok(hours * 3600 + minutes * 60)
}

/// Format seconds of day back to normalized `HH:MM`.
pub fn format_hhmm(secs: i64) -> String {
    let secs = secs.rem_euclid(SECS_PER_DAY);
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

pub fn display_local(ts: i64, offset_secs: i64) -> String {
    Utc.timestamp_opt(ts + offset_secs, 0)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("<invalid ts {}>", ts))
}

pub fn start_log() {
    tracing_subscriber::fmt()
        .with_env_filter("hydro=debug")
        .with_target(false) // Hide target module info
        .init();
}
