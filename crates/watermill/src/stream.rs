//! Stream identities, comparison keys and consumption handles
//!
//! This module provides the fundamental types shared by every other part of the mill:
//! - StreamType: the logical identity of a stream, used for routing and codec lookup
//! - RawElement: an element as the broker carries it, before deserialization
//! - Key / KeyExpr: ordered keys and the expressions extracting them from raw elements
//! - DataKey: the broker handle identifying a consumption position
//! - Record / StreamRecord: bounds on user element and result types

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{WindowError, WindowResult};

/// An element as carried by a broker, before deserialization
pub type RawElement = serde_json::Value;

/// Logical identity of a stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamType(String);

impl StreamType {
    /// Create a new stream type
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the stream
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for StreamType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&StreamType> for StreamType {
    fn from(stream: &StreamType) -> Self {
        stream.clone()
    }
}

/// Ordered comparison key
///
/// Keys order by kind first (`Null < Bool < number < Str < Time < Composite`)
/// and by value within a kind. Integers and floats form one numeric kind
/// compared by value, so `Int(3)` sorts after `Float(2.5)` and equals
/// `Float(3.0)`. Join expressions and window functions both produce keys,
/// which lets one comparator shape serve ordering joins and window grouping alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Key {
    /// Missing or null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number, ordered with `f64::total_cmp`
    Float(f64),
    /// String value; objects are keyed by their text
    Str(String),
    /// Point in time
    Time(DateTime<Utc>),
    /// Multi-part key, compared lexicographically
    Composite(Vec<Key>),
}

/// Numeric key value; `Float` only holds values without an exact `i64` form
#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of_float(value: f64) -> Self {
        // i64::MAX as f64 rounds up to 2^63, which is out of range
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
            Number::Int(value as i64)
        } else {
            Number::Float(value)
        }
    }

    fn cmp(self, other: Self) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (Number::Float(a), Number::Float(b)) => a.total_cmp(&b),
            (Number::Int(a), Number::Float(b)) => (a as f64).total_cmp(&b),
            (Number::Float(a), Number::Int(b)) => a.total_cmp(&(b as f64)),
        }
    }
}

impl Key {
    /// Build a key from a JSON value
    pub fn from_value(value: &RawElement) -> Self {
        match value {
            serde_json::Value::Null => Key::Null,
            serde_json::Value::Bool(b) => Key::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Key::Int(i),
                None => Key::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Key::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Key::Composite(items.iter().map(Key::from_value).collect())
            }
            serde_json::Value::Object(_) => Key::Str(value.to_string()),
        }
    }

    /// Create a composite key from its parts
    pub fn composite(parts: impl IntoIterator<Item = Key>) -> Self {
        Key::Composite(parts.into_iter().collect())
    }

    /// Returns true for the null key
    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Null => 0,
            Key::Bool(_) => 1,
            Key::Int(_) | Key::Float(_) => 2,
            Key::Str(_) => 3,
            Key::Time(_) => 4,
            Key::Composite(_) => 5,
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Key::Int(i) => Some(Number::Int(*i)),
            Key::Float(f) => Some(Number::of_float(*f)),
            _ => None,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Str(a), Key::Str(b)) => a.cmp(b),
            (Key::Time(a), Key::Time(b)) => a.cmp(b),
            (Key::Composite(a), Key::Composite(b)) => a.cmp(b),
            _ => match (self.number(), other.number()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Key::Null => {}
            Key::Bool(b) => b.hash(state),
            Key::Int(_) | Key::Float(_) => match self.number() {
                Some(Number::Int(i)) => i.hash(state),
                Some(Number::Float(f)) => f.to_bits().hash(state),
                None => {}
            },
            Key::Str(s) => s.hash(state),
            Key::Time(t) => t.hash(state),
            Key::Composite(parts) => parts.hash(state),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => f.write_str("null"),
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::Float(x) => write!(f, "{}", x),
            Key::Str(s) => write!(f, "{}", s),
            Key::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Key::Composite(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(","))
            }
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Float(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<DateTime<Utc>> for Key {
    fn from(value: DateTime<Utc>) -> Self {
        Key::Time(value)
    }
}

/// Expression extracting a comparison key from a raw element
pub type KeyExpr = Arc<dyn Fn(&RawElement) -> Key + Send + Sync>;

/// Key expression reading the value at a JSON pointer (`/order/id`)
///
/// Missing values yield [`Key::Null`].
pub fn field(pointer: impl Into<String>) -> KeyExpr {
    let pointer = pointer.into();
    Arc::new(move |element: &RawElement| {
        element
            .pointer(&pointer)
            .map(Key::from_value)
            .unwrap_or(Key::Null)
    })
}

/// Key expression reading a timestamp at a JSON pointer
///
/// Accepts RFC 3339 strings and epoch-millisecond integers. Missing or
/// unparseable timestamps yield [`Key::Null`].
pub fn time_field(pointer: impl Into<String>) -> KeyExpr {
    let pointer = pointer.into();
    Arc::new(move |element: &RawElement| {
        extract_time(element, &pointer)
            .map(Key::Time)
            .unwrap_or(Key::Null)
    })
}

/// Wrap a closure as a key expression
pub fn key_expr<F>(f: F) -> KeyExpr
where
    F: Fn(&RawElement) -> Key + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Read a timestamp at a JSON pointer
pub fn extract_time(element: &RawElement, pointer: &str) -> WindowResult<DateTime<Utc>> {
    let value = element
        .pointer(pointer)
        .filter(|v| !v.is_null())
        .ok_or_else(|| WindowError::MissingTimestamp {
            pointer: pointer.to_string(),
        })?;

    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| WindowError::InvalidTimestamp {
                pointer: pointer.to_string(),
                reason: e.to_string(),
            }),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| WindowError::InvalidTimestamp {
                pointer: pointer.to_string(),
                reason: format!("{} is not a valid epoch-millisecond value", n),
            }),
        other => Err(WindowError::InvalidTimestamp {
            pointer: pointer.to_string(),
            reason: format!("unsupported timestamp value {}", other),
        }),
    }
}

/// Broker handle identifying a consumption position
///
/// `key` identifies the handle in the mill's pending acknowledgement set,
/// `positions` holds the per-stream offsets a commit of this handle advances to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataKey {
    /// Unique handle id
    pub key: u64,
    /// Next offset to consume, per stream
    pub positions: BTreeMap<StreamType, u64>,
}

impl DataKey {
    /// Create a new data key
    pub fn new(key: u64, positions: BTreeMap<StreamType, u64>) -> Self {
        Self { key, positions }
    }

    /// Position recorded for a stream
    pub fn position(&self, stream: &StreamType) -> Option<u64> {
        self.positions.get(stream).copied()
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey({})", self.key)
    }
}

/// Bounds on element types flowing through a mill
///
/// Elements are used as map keys when children are attached to their parents,
/// hence `Eq + Hash`.
pub trait Record: DeserializeOwned + Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> Record for T where T: DeserializeOwned + Clone + Eq + Hash + Send + Sync + 'static {}

/// Result records that know which stream they are published to
///
/// Used when results are saved asynchronously, where one batch may hold
/// records bound for different streams.
pub trait StreamRecord {
    /// Stream this record is published to
    fn stream_type(&self) -> StreamType;
}
