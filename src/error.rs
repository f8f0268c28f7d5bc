//! Error types for policy-watcher.

/// Result type alias for policy-watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while publishing or receiving policy notifications.
///
/// None of these are surfaced by the `update_for_*` publish operations or the
/// subscriber loop; they are logged there and absorbed. They are returned by
/// the codec, the [`Bus`](crate::bus::Bus) implementations, option loading and
/// [`Watcher::try_publish`](crate::core::Watcher::try_publish).
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// A message could not be encoded for transport.
    #[error("Failed to encode message: {0}")]
    EncodeError(String),

    /// Inbound bytes are not a valid notification message.
    #[error("Failed to decode message: {0}")]
    DecodeError(String),

    /// The bus is unreachable or no pooled connection became available in time.
    #[error("Bus connection error: {0}")]
    ConnectionError(String),

    /// The long-lived subscription was dropped by the broker.
    #[error("Subscription lost: {0}")]
    SubscriptionError(String),

    /// Failed to load watcher options from a source.
    #[error("Failed to load options: {0}")]
    LoadError(String),

    /// Failed to deserialize watcher options.
    #[error("Failed to deserialize options: {0}")]
    DeserializationError(String),

    /// Watcher options are inconsistent or incomplete.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A watcher was started outside a Tokio runtime.
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// The watcher has been closed.
    #[error("Watcher is closed")]
    Closed,
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for WatcherError {
    fn from(err: redis::RedisError) -> Self {
        WatcherError::ConnectionError(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<bb8::RunError<redis::RedisError>> for WatcherError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(err) => WatcherError::ConnectionError(err.to_string()),
            bb8::RunError::TimedOut => {
                WatcherError::ConnectionError("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = WatcherError::ConnectionError("refused".to_string());
        assert_eq!(err.to_string(), "Bus connection error: refused");
        assert_eq!(WatcherError::Closed.to_string(), "Watcher is closed");
    }
}
