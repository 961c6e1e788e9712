//! Ordering primitive driving every broker pull
//!
//! A [`Comparator`] tells the broker where a candidate element stands relative
//! to a reference point. The same shape serves two purposes:
//!
//! - **Joins**: the reference is the key of the current left element and the
//!   candidate is the next element of the right stream.
//! - **Windows**: the reference is the current window key and the candidate is
//!   the next element of the root stream.
//!
//! ```text
//! reference:        k
//! candidates:   k-1 k k k+1
//! shift:          G E E L
//!                 |     `-- ahead: stays buffered, iteration stops
//!                 `-------- stale: discarded by the broker
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::stream::{Key, KeyExpr, RawElement};
use crate::window::WindowFn;

/// Position of the reference relative to a candidate element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamsShift {
    /// The reference is behind the candidate: the candidate is ahead
    Less,
    /// The candidate is aligned with the reference
    Equal,
    /// The reference is ahead of the candidate: the candidate is stale
    Greater,
}

impl From<Ordering> for StreamsShift {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => StreamsShift::Less,
            Ordering::Equal => StreamsShift::Equal,
            Ordering::Greater => StreamsShift::Greater,
        }
    }
}

/// Decides where a candidate element stands relative to a reference
pub type Comparator = Arc<dyn Fn(&RawElement) -> StreamsShift + Send + Sync>;

/// Compare a left (reference) key against a right (candidate) key
pub fn compare_streams(left: &Key, right: &Key) -> StreamsShift {
    left.cmp(right).into()
}

/// Comparator matching right elements against the key of a left element
pub fn join_comparator(left_key: Key, right_expression: KeyExpr) -> Comparator {
    Arc::new(move |candidate: &RawElement| {
        compare_streams(&left_key, &right_expression(candidate))
    })
}

/// Comparator keeping root pulls inside the current window
///
/// Returns `Equal` while no window key is established or when the candidate
/// falls into the current window, `Less` otherwise. A candidate whose window
/// cannot be computed never matches.
pub fn window_comparator(window_key: Option<Key>, window: Arc<dyn WindowFn>) -> Comparator {
    Arc::new(move |candidate: &RawElement| match &window_key {
        None => StreamsShift::Equal,
        Some(current) => match window.window_key(Some(candidate)) {
            Ok(key) if key == *current => StreamsShift::Equal,
            _ => StreamsShift::Less,
        },
    })
}
