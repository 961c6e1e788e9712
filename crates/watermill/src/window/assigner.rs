//! Window functions
//!
//! A window function maps a root element to the key of the window it belongs
//! to. It is also called without an element when a pull times out, in which
//! case it reports the window that is current "now" so the mill can tell
//! whether the accumulated window has been left behind.

use super::types::WindowBounds;
use super::WindowFn;
use crate::error::{WindowError, WindowResult};
use crate::stream::{extract_time, Key, RawElement};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// Source of the current time, used when no element is available
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Tumbling window function
///
/// Fixed-size, non-overlapping time windows. Each element is keyed by the
/// start of the window its timestamp falls into.
///
/// # Example
/// ```text
/// Window size: 5 seconds
/// Element at timestamp 7 -> Window [5, 10), key 5
/// Element at timestamp 12 -> Window [10, 15), key 10
/// ```
#[derive(Clone)]
pub struct TumblingWindow {
    /// Size of each window
    size: Duration,
    /// Offset for window alignment
    offset: Duration,
    /// JSON pointer of the element timestamp
    time_pointer: String,
    /// Clock consulted on timeouts
    clock: Clock,
}

impl TumblingWindow {
    /// Create a new tumbling window over the timestamp at `time_pointer`
    pub fn new(size: Duration, time_pointer: impl Into<String>) -> WindowResult<Self> {
        if size <= Duration::zero() {
            return Err(WindowError::InvalidWindowSize {
                size: size.num_milliseconds(),
            });
        }

        Ok(Self {
            size,
            offset: Duration::zero(),
            time_pointer: time_pointer.into(),
            clock: Arc::new(Utc::now),
        })
    }

    /// Create a one-day tumbling window
    pub fn daily(time_pointer: impl Into<String>) -> Self {
        Self {
            size: Duration::days(1),
            offset: Duration::zero(),
            time_pointer: time_pointer.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set an offset for window alignment
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    /// Replace the clock consulted on timeouts
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Window size
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Bounds of the window containing `timestamp`
    pub fn bounds(&self, timestamp: DateTime<Utc>) -> WindowBounds {
        WindowBounds::aligned(timestamp, self.size, self.offset)
    }
}

impl WindowFn for TumblingWindow {
    fn window_key(&self, element: Option<&RawElement>) -> WindowResult<Key> {
        let timestamp = match element {
            Some(element) => extract_time(element, &self.time_pointer)?,
            None => (self.clock)(),
        };
        Ok(self.bounds(timestamp).key())
    }
}

impl fmt::Debug for TumblingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TumblingWindow")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("time_pointer", &self.time_pointer)
            .finish()
    }
}

/// Window keyed directly by a field of the element
///
/// Consecutive elements sharing the field value form one window. Without an
/// element the key is [`Key::Null`], so a poll timeout closes the current group.
#[derive(Debug, Clone)]
pub struct FieldWindow {
    pointer: String,
}

impl FieldWindow {
    /// Create a window over the value at a JSON pointer
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl WindowFn for FieldWindow {
    fn window_key(&self, element: Option<&RawElement>) -> WindowResult<Key> {
        Ok(element
            .and_then(|e| e.pointer(&self.pointer))
            .map(Key::from_value)
            .unwrap_or(Key::Null))
    }
}

/// Window function backed by a closure
pub struct FnWindow<F> {
    f: F,
}

impl<F> fmt::Debug for FnWindow<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnWindow")
    }
}

impl<F> WindowFn for FnWindow<F>
where
    F: Fn(Option<&RawElement>) -> WindowResult<Key> + Send + Sync,
{
    fn window_key(&self, element: Option<&RawElement>) -> WindowResult<Key> {
        (self.f)(element)
    }
}

/// Wrap a closure as a window function
pub fn window_fn<F>(f: F) -> FnWindow<F>
where
    F: Fn(Option<&RawElement>) -> WindowResult<Key> + Send + Sync,
{
    FnWindow { f }
}
