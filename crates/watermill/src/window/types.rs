//! Window bounds
//!
//! Time windows produced by [`super::TumblingWindow`] are half-open ranges
//! `[start, start + size)`; the key handed to the mill is the start.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stream::Key;

/// Half-open time range of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Bounds of the `size`-wide window holding `timestamp`, grid shifted by `offset`
    ///
    /// Alignment is computed on epoch milliseconds and rounds towards negative
    /// infinity, so timestamps before the epoch land in the window below them.
    pub fn aligned(timestamp: DateTime<Utc>, size: Duration, offset: Duration) -> Self {
        let size_ms = size.num_milliseconds().max(1);
        let offset_ms = offset.num_milliseconds();
        let start_ms =
            (timestamp.timestamp_millis() - offset_ms).div_euclid(size_ms) * size_ms + offset_ms;
        let start = DateTime::from_timestamp_millis(start_ms).unwrap_or(timestamp);

        Self::new(start, start + Duration::milliseconds(size_ms))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Window key of every element inside these bounds
    pub fn key(&self) -> Key {
        Key::Time(self.start)
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_aligned_bounds_are_half_open() {
        let bounds = WindowBounds::aligned(ts(1500), Duration::seconds(1), Duration::zero());
        assert_eq!(bounds, WindowBounds::new(ts(1000), ts(2000)));
        assert!(bounds.contains(ts(1000)));
        assert!(!bounds.contains(ts(2000)));
        assert_eq!(bounds.duration(), Duration::seconds(1));
        assert_eq!(bounds.key(), Key::Time(ts(1000)));
    }

    #[test]
    fn test_alignment_with_offset_and_before_epoch() {
        let shifted = WindowBounds::aligned(ts(1100), Duration::seconds(1), Duration::milliseconds(200));
        assert_eq!(shifted.start, ts(200));

        let early = WindowBounds::aligned(ts(-1), Duration::seconds(1), Duration::zero());
        assert_eq!(early.start, ts(-1000));
    }

    #[test]
    fn test_display() {
        let bounds = WindowBounds::new(ts(0), ts(60_000));
        assert_eq!(
            bounds.to_string(),
            "[1970-01-01T00:00:00.000Z, 1970-01-01T00:01:00.000Z)"
        );
    }
}
