//! Timestamp rendering for flow output.
//!
//! Flow timestamps are milliseconds since the Unix epoch. They are rendered
//! in the time zone reported by a [`Zone`], so tests can pin the offset while
//! production code follows the host's local time.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use thiserror::Error;

/// Calendar format of first-seen and last-seen columns.
pub const SEEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from timestamp rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("timestamp {0} ms is outside the representable calendar range")]
    OutOfRange(u64),

    #[error("UTC offset {0} s is outside +/-86399 s")]
    InvalidOffset(i32),
}

/// Trait for resolving the UTC offset in effect at a given instant.
pub trait Zone: Send + Sync + fmt::Debug {
    /// Offset to apply at `unix_sec`.
    fn offset_at(&self, unix_sec: i64) -> FixedOffset;
}

/// Host local time, as configured in the environment (`TZ`, `/etc/localtime`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalZone;

impl Zone for LocalZone {
    fn offset_at(&self, unix_sec: i64) -> FixedOffset {
        match DateTime::<Utc>::from_timestamp(unix_sec, 0) {
            Some(utc) => Local.offset_from_utc_datetime(&utc.naive_utc()).fix(),
            None => Utc.fix(),
        }
    }
}

/// Zone pinned to a single offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedZone {
    offset: FixedOffset,
}

impl FixedZone {
    /// Create a zone `seconds_east` of UTC, rejecting offsets of a day or more.
    pub fn try_new(seconds_east: i32) -> Result<Self, TimeError> {
        FixedOffset::east_opt(seconds_east)
            .map(|offset| Self { offset })
            .ok_or(TimeError::InvalidOffset(seconds_east))
    }

    /// Like [`FixedZone::try_new`], but out-of-range offsets fall back to UTC.
    /// Use it for offsets known at compile time.
    pub fn new(seconds_east: i32) -> Self {
        Self::try_new(seconds_east).unwrap_or_else(|_| Self { offset: Utc.fix() })
    }

    pub fn utc() -> Self {
        Self::new(0)
    }
}

impl Zone for FixedZone {
    fn offset_at(&self, _unix_sec: i64) -> FixedOffset {
        self.offset
    }
}

/// Split a millisecond epoch value into whole seconds and the 0-999 remainder.
pub fn split_msec(msec: u64) -> (i64, u32) {
    // u64::MAX / 1000 is well below i64::MAX.
    ((msec / 1000) as i64, (msec % 1000) as u32)
}

fn to_local(msec: u64, zone: &dyn Zone) -> Result<(DateTime<FixedOffset>, u32), TimeError> {
    let (secs, millis) = split_msec(msec);
    let utc = DateTime::<Utc>::from_timestamp(secs, 0).ok_or(TimeError::OutOfRange(msec))?;
    Ok((utc.with_timezone(&zone.offset_at(secs)), millis))
}

/// Render a first-seen or last-seen column: `YYYY-MM-DD HH:MM:SS`.
pub fn format_seen(msec: u64, zone: &dyn Zone) -> Result<String, TimeError> {
    let (local, _) = to_local(msec, zone)?;
    Ok(local.format(SEEN_FORMAT).to_string())
}

/// Render the received-time column: `,YYYY-MM-DD HH:MM:SS.mmm`.
///
/// The leading comma belongs to this column's rendering; callers append it
/// without a separator of their own.
pub fn format_received(msec: u64, zone: &dyn Zone) -> Result<String, TimeError> {
    let (local, millis) = to_local(msec, zone)?;
    Ok(format!(",{}.{:03}", local.format(SEEN_FORMAT), millis))
}

/// Render a flow duration in seconds with millisecond precision.
pub fn format_duration(first_msec: u64, last_msec: u64) -> String {
    let duration = last_msec.saturating_sub(first_msec) as f64 / 1000.0;
    format!("{:.3}", duration)
}
