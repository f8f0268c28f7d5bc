//! Publish/subscribe transports.
//!
//! The watcher treats the transport as a black box offering two operations:
//! publish a payload to a channel, and subscribe to a channel as a stream of
//! payloads. Implement [`Bus`] to plug in a broker.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

pub use memory::MemoryBus;

#[cfg(feature = "redis")]
pub use self::redis::RedisBus;

/// Stream of raw payloads received on one channel.
///
/// The stream ending means the subscription connection was lost.
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Trait for pub/sub transports.
///
/// Implementations must be safe to share between the publishing callers and
/// the watcher's subscriber task.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a payload to every subscriber of `channel`.
    ///
    /// Implementations backed by a connection pool acquire a connection for
    /// the duration of the call and release it on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`](crate::error::WatcherError::ConnectionError)
    /// if the broker cannot be reached or no connection is available in time.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()>;

    /// Open a long-lived subscription to `channel`.
    ///
    /// Dropping the returned stream releases the subscription connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`](crate::error::WatcherError::ConnectionError)
    /// if the subscription cannot be established.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream>;

    /// Get a human-readable name for this bus (for logging/debugging).
    fn name(&self) -> String;
}
