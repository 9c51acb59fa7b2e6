//! Host timezone offset source.
//!
//! The session needs a whole-hour UTC offset when setting the device clock.
//! It asks a [`UtcOffsetSource`] rather than reading process-global state, so
//! tests can pin the offset with [`FixedUtcOffset`].

use chrono::{Local, Offset};

/// Provides the host's current offset from UTC in whole hours.
pub trait UtcOffsetSource: Send + Sync {
    /// Current offset east of UTC, in hours, including daylight saving.
    fn current_utc_offset_hours(&self) -> i8;
}

/// Reads the offset from the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostUtcOffset;

impl UtcOffsetSource for HostUtcOffset {
    fn current_utc_offset_hours(&self) -> i8 {
        let seconds = Local::now().offset().fix().local_minus_utc();
        offset_seconds_to_hours(seconds)
    }
}

/// A constant offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedUtcOffset(pub i8);

impl UtcOffsetSource for FixedUtcOffset {
    fn current_utc_offset_hours(&self) -> i8 {
        self.0
    }
}

/// Convert seconds east of UTC to whole hours, rounding toward negative
/// infinity. Zones with a half-hour component therefore round west:
/// +05:30 becomes 5 and -03:30 becomes -4.
pub fn offset_seconds_to_hours(seconds: i32) -> i8 {
    let hours = seconds.div_euclid(3600);
    i8::try_from(hours).unwrap_or(if hours < 0 { i8::MIN } else { i8::MAX })
}
