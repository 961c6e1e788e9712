//! Error types for the water mill
//!
//! Pull outcomes such as a right stream running ahead, a poll timeout or the
//! end of a stream are ordinary control flow (see [`crate::broker::Pull`]) and
//! never show up here. The types below cover genuine failures: broken broker
//! transports, undecodable payloads, misconfigured join trees, window functions
//! that cannot key an element, and errors raised by the processing callback.

use crate::stream::StreamType;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum MillError {
    /// Configuration errors, raised eagerly when a mill is built
    #[error("configuration error: {source}")]
    Configuration {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Broker transport errors
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Window keying errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The processing callback failed. Never retried.
    #[error("processing failed: {0}")]
    Process(#[source] anyhow::Error),

    /// The callback produced nothing although a return stream is declared
    #[error("processing produced no result for declared return stream '{stream}'")]
    MissingResult { stream: StreamType },
}

impl MillError {
    /// Shorthand for a configuration error with a plain message
    pub fn configuration(message: impl Into<String>) -> Self {
        MillError::Configuration {
            source: message.into().into(),
        }
    }
}

/// Message broker errors
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The broker was shut down
    #[error("broker closed")]
    Closed,

    /// A stream the broker does not carry was addressed
    #[error("unknown stream: {stream}")]
    UnknownStream { stream: StreamType },

    /// Transport-level failure reported by a broker implementation
    #[error("transport failure on '{stream}': {reason}")]
    Transport { stream: StreamType, reason: String },
}

/// Window keying errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// The element carries no usable timestamp
    #[error("element has no timestamp at '{pointer}'")]
    MissingTimestamp { pointer: String },

    /// The timestamp could not be interpreted
    #[error("invalid timestamp at '{pointer}': {reason}")]
    InvalidTimestamp { pointer: String, reason: String },

    /// Window size is invalid
    #[error("invalid window size: {size}ms, must be greater than 0")]
    InvalidWindowSize { size: i64 },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MillError>;

/// Result type alias for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

impl From<serde_json::Error> for MillError {
    fn from(err: serde_json::Error) -> Self {
        MillError::Serialization(err.to_string())
    }
}

impl From<figment::Error> for MillError {
    fn from(err: figment::Error) -> Self {
        MillError::Configuration {
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = WindowError::InvalidWindowSize { size: 0 };
        assert!(err.to_string().contains("invalid window size"));
    }

    #[test]
    fn test_broker_error_display() {
        let err = BrokerError::UnknownStream {
            stream: StreamType::from("orders"),
        };
        assert_eq!(err.to_string(), "unknown stream: orders");
    }

    #[test]
    fn test_missing_result_display() {
        let err = MillError::MissingResult {
            stream: StreamType::from("enriched"),
        };
        assert!(err.to_string().contains("'enriched'"));
    }

    #[test]
    fn test_mill_error_from_window_error() {
        let window_err = WindowError::MissingTimestamp {
            pointer: "/ts".to_string(),
        };
        let mill_err: MillError = window_err.into();
        assert!(matches!(mill_err, MillError::Window(_)));
    }

    #[test]
    fn test_mill_error_from_serde_json() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let mill_err: MillError = err.into();
        assert!(matches!(mill_err, MillError::Serialization(_)));
    }
}
