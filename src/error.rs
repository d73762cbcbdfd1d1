//! # Structured Error Handling
//!
//! Internal operations return `Result<T, CacheError>`; the public cache
//! boundary converts failures into safe defaults (miss for reads, no-op for
//! writes and invalidations) rather than propagating them to the caller.

use thiserror::Error;

/// Errors that can occur inside the cache layer.
///
/// None of these escape the public `TaggedCache` operations - they are
/// logged and replaced with the operation's safe default.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Remote store command or connection failure.
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Malformed wire record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload bytes in a stored record were not valid base64.
    #[error("payload encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A deferred payload producer failed before yielding bytes.
    #[error("payload producer failed: {0}")]
    Producer(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Configuration("bad TTL".to_string());
        assert_eq!(err.to_string(), "configuration error: bad TTL");

        let err = CacheError::Producer("upstream fetch aborted".to_string());
        assert_eq!(
            err.to_string(),
            "payload producer failed: upstream fetch aborted"
        );
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
