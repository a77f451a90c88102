//! Time and duration conversion utilities.
//!
//! Conversions saturate instead of truncating, and the formatting helpers
//! produce the clock strings shown next to lyric lines and seek bars.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Convert duration to seconds as u32, saturating at `u32::MAX`.
    ///
    /// `u32::MAX` seconds is approximately 136 years, far beyond any track.
    fn as_secs_u32(&self) -> u32;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn as_secs_u32(&self) -> u32 {
        u32::try_from(self.as_secs()).unwrap_or(u32::MAX)
    }
}

/// Format a position as an LRC tag, `[mm:ss.cc]`.
#[must_use]
pub fn format_lrc_timestamp(position: Duration) -> String {
    format!("[{}]", format_clock_detailed(position))
}

/// Format a position as `mm:ss` for display.
#[must_use]
pub fn format_clock(position: Duration) -> String {
    let total_secs = position.as_secs();
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Format a position as `mm:ss.cc` (centiseconds).
#[must_use]
pub fn format_clock_detailed(position: Duration) -> String {
    let total_secs = position.as_secs();
    let centis = position.subsec_millis() / 10;
    format!("{:02}:{:02}.{centis:02}", total_secs / 60, total_secs % 60)
}
