//! In-process bus backed by `tokio::sync::broadcast`.

use super::{Bus, MessageStream};
use crate::error::{Result, WatcherError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Payloads buffered per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory implementation of [`Bus`].
///
/// Every watcher sharing one `MemoryBus` sees every other watcher's
/// publishes, which makes it suitable for single-process deployments and
/// tests. It can also simulate broker trouble: [`set_online`] makes every
/// call fail with a connection error, and [`disconnect_subscribers`] ends
/// all open subscriptions the way a broker-side disconnect would.
///
/// [`set_online`]: MemoryBus::set_online
/// [`disconnect_subscribers`]: MemoryBus::disconnect_subscribers
///
/// # Examples
///
/// ```rust
/// use policy_watcher::bus::{Bus, MemoryBus};
/// use tokio_stream::StreamExt;
///
/// # async fn example() -> policy_watcher::error::Result<()> {
/// let bus = MemoryBus::new();
/// let mut stream = bus.subscribe("policy").await?;
/// bus.publish("policy", b"hello".to_vec()).await?;
/// assert_eq!(stream.next().await, Some(b"hello".to_vec()));
/// # Ok(())
/// # }
/// ```
pub struct MemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    online: AtomicBool,
    published: AtomicU64,
    subscriptions_opened: AtomicU64,
    capacity: usize,
}

impl MemoryBus {
    /// Create a new in-memory bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with the given per-subscriber capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            published: AtomicU64::new(0),
            subscriptions_opened: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Bring the bus up or down. While down, publish and subscribe fail.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether the bus currently accepts calls.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// End every open subscription on every channel.
    ///
    /// Subscribers drain what was already delivered to them, then their
    /// streams end.
    pub fn disconnect_subscribers(&self) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        for sender in channels.values_mut() {
            // Dropping the only sender closes every receiver.
            *sender = broadcast::channel(self.capacity).0;
        }
        debug!(channels = channels.len(), "memory bus dropped all subscriptions");
    }

    /// Number of open subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(channel).map_or(0, |sender| sender.receiver_count())
    }

    /// Total payloads accepted for publishing.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Total subscriptions ever opened.
    pub fn subscriptions_opened(&self) -> u64 {
        self.subscriptions_opened.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(WatcherError::ConnectionError("memory bus is offline".to_string()))
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(sender) = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
        {
            return sender.clone();
        }

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_online()?;
        self.published.fetch_add(1, Ordering::SeqCst);

        // No receivers is not an error; the payload is simply dropped.
        let receivers = self.sender(channel).send(payload).unwrap_or(0);
        debug!(channel, receivers, "memory bus published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        self.ensure_online()?;

        let receiver = self.sender(channel).subscribe();
        self.subscriptions_opened.fetch_add(1, Ordering::SeqCst);

        let channel = channel.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(payload) => Some(payload),
            Err(err) => {
                debug!(channel = %channel, error = %err, "subscriber lagged, payloads dropped");
                None
            }
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}
