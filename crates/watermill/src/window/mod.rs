//! Windowing of the root stream
//!
//! When a window function is configured, consecutive root elements sharing a
//! window key are batched into a single callback invocation.
//!
//! ```text
//! root:     a1 a2 a3 | b1 b2 | c1 ...
//! windows:  [  A   ] [  B  ] [ C ...
//! calls:    f([a1,a2,a3])  f([b1,b2])
//! ```
//!
//! A window closes when the next root element falls into a different window
//! (the broker reports it as running ahead of the current window), when a poll
//! timeout shows that the clock has moved past the window, or when the root
//! stream ends.
//!
//! # Window functions
//!
//! - [`TumblingWindow`]: fixed-size time windows over a timestamp field
//! - [`FieldWindow`]: consecutive elements sharing a field value
//! - [`FnWindow`]: any closure, see [`window_fn`]
//!
//! # Example
//!
//! ```rust
//! use watermill::window::{TumblingWindow, WindowFn};
//! use chrono::Duration;
//! use serde_json::json;
//!
//! let window = TumblingWindow::new(Duration::minutes(5), "/ts").unwrap();
//! let a = window.window_key(Some(&json!({"ts": 60_000}))).unwrap();
//! let b = window.window_key(Some(&json!({"ts": 240_000}))).unwrap();
//! assert_eq!(a, b);
//! ```

pub mod accumulator;
pub mod assigner;
pub mod types;

pub use accumulator::WindowAccumulator;
pub use assigner::{window_fn, Clock, FieldWindow, FnWindow, TumblingWindow};
pub use types::WindowBounds;

use crate::error::WindowResult;
use crate::stream::{Key, RawElement};
use std::fmt;

/// Maps a root element to the key of its window
///
/// `None` is passed when a pull timed out; implementations report the window
/// that is current at that moment.
pub trait WindowFn: Send + Sync + fmt::Debug {
    /// Window key of an element, or of "now" when no element is available
    fn window_key(&self, element: Option<&RawElement>) -> WindowResult<Key>;
}
