//! Record (de)serialization
//!
//! Elements travel through brokers as [`RawElement`]s. Per-stream codecs turn
//! them into typed records on the way in and back on the way out. The JSON
//! codec is used for every stream without an explicit registration.
//!
//! Closures can be registered directly:
//!
//! ```rust
//! use watermill::codec::Codecs;
//! use watermill::stream::{RawElement, StreamType};
//! use serde_json::json;
//!
//! let codecs: Codecs<u64, u64> = Codecs::json().with_serializer(
//!     "totals",
//!     |total: &u64| -> watermill::Result<RawElement> { Ok(json!({ "total": total })) },
//! );
//!
//! let raw = codecs.serializer(&StreamType::from("totals")).serialize(&7).unwrap();
//! assert_eq!(raw, json!({ "total": 7 }));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::stream::{RawElement, StreamType};

/// Serializer trait for converting records to raw elements
pub trait RecordSerializer<O>: Send + Sync {
    /// Serialize a record
    fn serialize(&self, record: &O) -> Result<RawElement>;
}

/// Deserializer trait for converting raw elements to records
pub trait RecordDeserializer<T>: Send + Sync {
    /// Deserialize a raw element
    fn deserialize(&self, raw: &RawElement) -> Result<T>;
}

impl<O, F> RecordSerializer<O> for F
where
    F: Fn(&O) -> Result<RawElement> + Send + Sync,
{
    fn serialize(&self, record: &O) -> Result<RawElement> {
        self(record)
    }
}

impl<T, F> RecordDeserializer<T> for F
where
    F: Fn(&RawElement) -> Result<T> + Send + Sync,
{
    fn deserialize(&self, raw: &RawElement) -> Result<T> {
        self(raw)
    }
}

/// JSON codec, mapping records to and from plain JSON values
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<O: Serialize> RecordSerializer<O> for JsonCodec {
    fn serialize(&self, record: &O) -> Result<RawElement> {
        Ok(serde_json::to_value(record)?)
    }
}

impl<T: DeserializeOwned> RecordDeserializer<T> for JsonCodec {
    fn deserialize(&self, raw: &RawElement) -> Result<T> {
        Ok(T::deserialize(raw)?)
    }
}

/// Serializers for published records, by target stream
pub struct Serializers<O> {
    by_stream: HashMap<StreamType, Arc<dyn RecordSerializer<O>>>,
    default: Arc<dyn RecordSerializer<O>>,
}

impl<O> Serializers<O> {
    /// Serializer for a stream
    pub fn get(&self, stream: &StreamType) -> Arc<dyn RecordSerializer<O>> {
        self.by_stream
            .get(stream)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Serialize a record bound for `stream`
    pub fn serialize(&self, stream: &StreamType, record: &O) -> Result<RawElement> {
        self.get(stream).serialize(record)
    }
}

/// Deserializers for consumed elements, by source stream
pub struct Deserializers<T> {
    by_stream: HashMap<StreamType, Arc<dyn RecordDeserializer<T>>>,
    default: Arc<dyn RecordDeserializer<T>>,
}

impl<T> Deserializers<T> {
    /// Deserializer for a stream
    pub fn get(&self, stream: &StreamType) -> Arc<dyn RecordDeserializer<T>> {
        self.by_stream
            .get(stream)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Deserialize an element read from `stream`
    pub fn deserialize(&self, stream: &StreamType, raw: &RawElement) -> Result<T> {
        self.get(stream).deserialize(raw)
    }
}

/// Per-stream codec registry
pub struct Codecs<T, O> {
    serializers: Serializers<O>,
    deserializers: Deserializers<T>,
}

impl<T, O> Codecs<T, O>
where
    T: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    /// Registry falling back to [`JsonCodec`] for every stream
    pub fn json() -> Self {
        Self {
            serializers: Serializers {
                by_stream: HashMap::new(),
                default: Arc::new(JsonCodec),
            },
            deserializers: Deserializers {
                by_stream: HashMap::new(),
                default: Arc::new(JsonCodec),
            },
        }
    }
}

impl<T, O> Codecs<T, O> {
    /// Register a serializer for records published to `stream`
    pub fn with_serializer<S>(mut self, stream: impl Into<StreamType>, serializer: S) -> Self
    where
        S: RecordSerializer<O> + 'static,
    {
        self.serializers
            .by_stream
            .insert(stream.into(), Arc::new(serializer));
        self
    }

    /// Register a deserializer for elements read from `stream`
    pub fn with_deserializer<D>(mut self, stream: impl Into<StreamType>, deserializer: D) -> Self
    where
        D: RecordDeserializer<T> + 'static,
    {
        self.deserializers
            .by_stream
            .insert(stream.into(), Arc::new(deserializer));
        self
    }

    /// Serializer for a stream
    pub fn serializer(&self, stream: &StreamType) -> Arc<dyn RecordSerializer<O>> {
        self.serializers.get(stream)
    }

    /// Deserializer for a stream
    pub fn deserializer(&self, stream: &StreamType) -> Arc<dyn RecordDeserializer<T>> {
        self.deserializers.get(stream)
    }

    /// Split into the serializing and deserializing halves
    pub fn into_parts(self) -> (Serializers<O>, Deserializers<T>) {
        (self.serializers, self.deserializers)
    }
}

impl<T, O> std::fmt::Debug for Codecs<T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codecs")
            .field("serializers", &self.serializers.by_stream.keys().collect::<Vec<_>>())
            .field("deserializers", &self.deserializers.by_stream.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// JSON record usable as a mill element when no typed schema exists
///
/// Wraps an arbitrary JSON value and hashes it by its canonical text, which
/// makes it usable as a join parent key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRecord(pub serde_json::Value);

impl std::hash::Hash for JsonRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_string().hash(state);
    }
}

impl From<serde_json::Value> for JsonRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MillError;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: i64,
    }

    #[test]
    fn test_json_codec_round_trip() {
        let reading = Reading {
            sensor: "s1".to_string(),
            value: 42,
        };

        let raw = RecordSerializer::serialize(&JsonCodec, &reading).unwrap();
        assert_eq!(raw, json!({"sensor": "s1", "value": 42}));

        let back: Reading = RecordDeserializer::deserialize(&JsonCodec, &raw).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_json_codec_rejects_wrong_shape() {
        let result: Result<Reading> = RecordDeserializer::deserialize(&JsonCodec, &json!({"sensor": 1}));
        assert!(matches!(result, Err(MillError::Serialization(_))));
    }

    #[test]
    fn test_registry_overrides_per_stream() {
        let codecs: Codecs<i64, i64> = Codecs::json()
            .with_deserializer("wrapped", |raw: &RawElement| -> Result<i64> {
                raw["n"]
                    .as_i64()
                    .ok_or_else(|| MillError::Serialization("missing n".to_string()))
            });

        let wrapped = codecs.deserializer(&StreamType::from("wrapped"));
        assert_eq!(wrapped.deserialize(&json!({"n": 3})).unwrap(), 3);

        let plain = codecs.deserializer(&StreamType::from("plain"));
        assert_eq!(plain.deserialize(&json!(5)).unwrap(), 5);

        let (serializers, deserializers) = codecs.into_parts();
        assert_eq!(
            serializers.serialize(&StreamType::from("out"), &9).unwrap(),
            json!(9)
        );
        assert_eq!(
            deserializers
                .deserialize(&StreamType::from("wrapped"), &json!({"n": 4}))
                .unwrap(),
            4
        );
    }

    #[test]
    fn test_json_record_hash_matches_equality() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(JsonRecord(json!({"a": 1})));
        assert!(set.contains(&JsonRecord(json!({"a": 1}))));
        assert!(!set.contains(&JsonRecord(json!({"a": 2}))));
    }
}
