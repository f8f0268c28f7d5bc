//! Construction-time options for a watcher.

use crate::error::{Result, WatcherError};
use serde::Deserialize;
use std::time::Duration;

/// Default channel shared by cooperating watchers.
pub const DEFAULT_CHANNEL: &str = "/casbin";

/// Default connect timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default delay between subscription attempts, in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Sizing for the pool of short-lived publish connections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of connections the pool opens.
    pub max_size: u32,
    /// How long a publish waits for a free connection, in milliseconds.
    pub max_wait_ms: u64,
}

impl PoolOptions {
    /// Create pool options.
    pub fn new(max_size: u32, max_wait: Duration) -> Self {
        Self {
            max_size,
            max_wait_ms: millis(max_wait),
        }
    }

    /// Maximum wait for a pooled connection. Never zero.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.max(1))
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 8,
            max_wait_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Options recognized when constructing a watcher.
///
/// Every field has a default, so a partially filled file or environment
/// deserializes cleanly.
///
/// # Examples
///
/// ```rust
/// use policy_watcher::core::{PoolOptions, WatcherOptions};
/// use std::time::Duration;
///
/// let options = WatcherOptions::new("10.0.0.5", 6380)
///     .with_channel("casbin-prod")
///     .with_password("secret")
///     .with_pool(PoolOptions::new(16, Duration::from_millis(500)));
///
/// assert_eq!(options.timeout(), Duration::from_millis(2000));
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherOptions {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Channel all cooperating watchers publish and subscribe on.
    pub channel: String,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional broker password.
    pub password: Option<String>,
    /// Optional publish pool sizing. `None` uses [`PoolOptions::default`].
    pub pool: Option<PoolOptions>,
    /// Delay between subscription attempts after a failure or disconnect.
    pub reconnect_interval_ms: u64,
}

impl WatcherOptions {
    /// Options for the given endpoint with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    /// Set the broker password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Supply an explicit publish pool configuration.
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the delay between subscription attempts.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = millis(interval);
        self
    }

    /// Connect timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Check the options for values no transport can work with.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidOptions`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(WatcherError::InvalidOptions("channel must not be empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(WatcherError::InvalidOptions("host must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(WatcherError::InvalidOptions("timeout_ms must be > 0".to_string()));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(WatcherError::InvalidOptions(
                "reconnect_interval_ms must be > 0".to_string(),
            ));
        }
        if self.pool.as_ref().is_some_and(|pool| pool.max_size == 0) {
            return Err(WatcherError::InvalidOptions("pool.max_size must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            channel: DEFAULT_CHANNEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            password: None,
            pool: None,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WatcherOptions::default();
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.port, 6379);
        assert_eq!(options.channel, "/casbin");
        assert_eq!(options.timeout(), Duration::from_millis(2000));
        assert!(options.password.is_none());
        assert!(options.pool.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let options = WatcherOptions::new("redis.internal", 7000)
            .with_channel("policies")
            .with_timeout(Duration::from_secs(5))
            .with_password("pw")
            .with_reconnect_interval(Duration::from_millis(250));

        assert_eq!(options.host, "redis.internal");
        assert_eq!(options.port, 7000);
        assert_eq!(options.channel, "policies");
        assert_eq!(options.timeout_ms, 5000);
        assert_eq!(options.password.as_deref(), Some("pw"));
        assert_eq!(options.reconnect_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_empty_channel() {
        let options = WatcherOptions::default().with_channel("  ");
        assert!(matches!(options.validate(), Err(WatcherError::InvalidOptions(_))));
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let options = WatcherOptions::default().with_pool(PoolOptions::new(0, Duration::from_secs(1)));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_reconnect_interval() {
        let options = WatcherOptions::default().with_reconnect_interval(Duration::ZERO);
        assert!(matches!(options.validate(), Err(WatcherError::InvalidOptions(_))));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let options = WatcherOptions::default()
            .with_timeout(Duration::MAX)
            .with_reconnect_interval(Duration::MAX)
            .with_pool(PoolOptions::new(1, Duration::MAX));
        assert_eq!(options.timeout_ms, u64::MAX);
        assert_eq!(options.reconnect_interval_ms, u64::MAX);
        assert_eq!(options.pool.map(|p| p.max_wait_ms), Some(u64::MAX));
    }

    #[test]
    fn test_pool_wait_never_zero() {
        let pool = PoolOptions::new(1, Duration::ZERO);
        assert_eq!(pool.max_wait(), Duration::from_millis(1));
    }

    #[test]
    fn test_deserialize_partial() {
        let options: WatcherOptions =
            serde_json::from_str(r#"{"channel":"c1","pool":{"max_size":3}}"#).unwrap();
        assert_eq!(options.channel, "c1");
        assert_eq!(options.port, 6379);
        assert_eq!(options.pool, Some(PoolOptions { max_size: 3, max_wait_ms: 2000 }));
    }
}
