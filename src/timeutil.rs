use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::error::DaybotError;
use crate::Result;

/// Stored timestamp format. Chat-local, no offset suffix; the single
/// conversion away from offset-aware values happens in [`normalize_timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn now_local(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    raw.trim()
        .parse::<NaiveDateTime>()
        .map_err(|e| DaybotError::Parse(format!("invalid timestamp {raw:?}: {e}")))
}

/// Normalize a user-supplied instant into a chat-local naive timestamp.
///
/// Offset-aware input (RFC 3339) is converted into `tz` and the offset is
/// dropped; naive input is taken to already be chat-local.
pub fn normalize_timestamp(raw: &str, tz: Tz) -> Result<String> {
    let raw = raw.trim();
    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Ok(format_timestamp(aware.with_timezone(&tz).naive_local()));
    }
    parse_timestamp(raw).map(format_timestamp)
}

/// Strict `HH:MM` wall-clock parse: two digits, colon, two digits, in range.
/// `"9:3"` is rejected rather than silently padded.
pub fn parse_daily_time(raw: &str) -> Result<(u32, u32)> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 5
        && bytes[2] == b':'
        && bytes[0].is_ascii_digit()
        && bytes[1].is_ascii_digit()
        && bytes[3].is_ascii_digit()
        && bytes[4].is_ascii_digit();
    if !well_formed {
        return Err(DaybotError::Parse(format!(
            "daily time must be HH:MM (24h), got {raw:?}"
        )));
    }

    let hour: u32 = raw[..2]
        .parse()
        .map_err(|e| DaybotError::Parse(format!("invalid hour in {raw:?}: {e}")))?;
    let minute: u32 = raw[3..]
        .parse()
        .map_err(|e| DaybotError::Parse(format!("invalid minute in {raw:?}: {e}")))?;
    if hour > 23 || minute > 59 {
        return Err(DaybotError::Parse(format!("daily time out of range: {raw:?}")));
    }
    Ok((hour, minute))
}

/// Next wall-clock occurrence of `hour:minute` strictly after `now`.
pub fn next_daily_occurrence(now: NaiveDateTime, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    let today = now.date().and_hms_opt(hour, minute, 0)?;
    if today > now {
        Some(today)
    } else {
        today.checked_add_signed(Duration::days(1))
    }
}

/// Delay from `now` until `target`, clamped to zero when `target` already
/// passed (a missed reminder fires immediately on recovery).
pub fn delay_until(now: NaiveDateTime, target: NaiveDateTime) -> std::time::Duration {
    (target - now).to_std().unwrap_or(std::time::Duration::ZERO)
}
