//! Redis pub/sub bus with a bb8 pool of publish connections.

use super::{Bus, MessageStream};
use crate::core::{PoolOptions, WatcherOptions};
use crate::error::{Result, WatcherError};
use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::debug;

fn connection_info(options: &WatcherOptions) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(options.host.clone(), options.port),
        redis: RedisConnectionInfo {
            password: options.password.clone(),
            ..Default::default()
        },
    }
}

/// Redis-backed implementation of [`Bus`].
///
/// Publishes borrow a connection from a bb8 pool for the length of one
/// `PUBLISH` command; the pooled connection goes back to the pool when the
/// guard drops, whether the command succeeded or not. Subscriptions use a
/// dedicated pub/sub connection outside the pool.
///
/// # Examples
///
/// ```rust,no_run
/// use policy_watcher::bus::RedisBus;
/// use policy_watcher::core::WatcherOptions;
///
/// # fn example() -> policy_watcher::error::Result<()> {
/// let options = WatcherOptions::new("127.0.0.1", 6379).with_password("foobared");
/// let bus = RedisBus::from_options(&options)?;
/// # Ok(())
/// # }
/// ```
pub struct RedisBus {
    client: Client,
    pool: Pool<RedisConnectionManager>,
    timeout: Duration,
    endpoint: String,
}

impl RedisBus {
    /// Build a bus from watcher options.
    ///
    /// No connection is made here; the pool connects lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidOptions`] if the endpoint cannot be
    /// turned into a Redis connection address.
    pub fn from_options(options: &WatcherOptions) -> Result<Self> {
        let info = connection_info(options);
        let client = Client::open(info.clone())
            .map_err(|e| WatcherError::InvalidOptions(format!("Invalid redis endpoint: {}", e)))?;
        let manager = RedisConnectionManager::new(info)
            .map_err(|e| WatcherError::InvalidOptions(format!("Invalid redis endpoint: {}", e)))?;
        let pool_options = options.pool.clone().unwrap_or_default();

        Ok(Self {
            pool: Self::build_pool(manager, &pool_options),
            client,
            timeout: options.timeout(),
            endpoint: format!("{}:{}", options.host, options.port),
        })
    }

    fn build_pool(manager: RedisConnectionManager, pool: &PoolOptions) -> Pool<RedisConnectionManager> {
        Pool::builder()
            .max_size(pool.max_size.max(1))
            .connection_timeout(pool.max_wait())
            .build_unchecked(manager)
    }

    /// Connections currently held by the publish pool.
    pub fn pooled_connections(&self) -> u32 {
        self.pool.state().connections
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut *conn)
            .await?;
        debug!(channel, receivers, "redis published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        let mut pubsub = tokio::time::timeout(self.timeout, self.client.get_async_pubsub())
            .await
            .map_err(|_| WatcherError::ConnectionError("redis subscribe timed out".to_string()))??;
        pubsub.subscribe(channel).await?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        Ok(Box::pin(stream))
    }

    fn name(&self) -> String {
        format!("redis:{}", self.endpoint)
    }
}
