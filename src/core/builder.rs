//! Builder for constructing Watcher instances.

use crate::bus::Bus;
use crate::core::{Watcher, WatcherOptions};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

/// Builder for constructing a [`Watcher`].
///
/// Without an explicit bus the watcher talks to Redis at the endpoint in the
/// options. Building spawns the subscriber task, so it must run inside a
/// Tokio runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use policy_watcher::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let options = OptionsLoader::new()
///     .with_file("config/watcher.yaml")
///     .with_env_overrides("WATCHER", "__")
///     .load()?;
///
/// let watcher = Watcher::builder().with_options(options).build()?;
/// # Ok(())
/// # }
/// ```
pub struct WatcherBuilder {
    options: WatcherOptions,
    bus: Option<Arc<dyn Bus>>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatcherMetrics>,
}

impl WatcherBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self {
            options: WatcherOptions::default(),
            bus: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Replace all options.
    pub fn with_options(mut self, options: WatcherOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.options.channel = channel.into();
        self
    }

    /// Set the delay between subscription attempts.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_reconnect_interval(interval);
        self
    }

    /// Use a custom bus instead of Redis.
    ///
    /// Endpoint, password and pool options are ignored when a bus is given;
    /// channel and reconnect interval still apply.
    pub fn with_bus(mut self, bus: Arc<dyn Bus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Record publish, receive and reconnect metrics with the given meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(WatcherMetrics::new(meter));
        self
    }

    /// Validate the options, create the bus and start the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options fail validation
    /// - No bus was given and the crate was built without Redis support
    /// - Called outside a Tokio runtime
    pub fn build(self) -> Result<Watcher> {
        self.options.validate()?;

        let bus = match self.bus {
            Some(bus) => bus,
            None => Self::default_bus(&self.options)?,
        };

        Watcher::start(
            bus,
            self.options.channel.clone(),
            self.options.reconnect_interval(),
            #[cfg(feature = "metrics")]
            self.metrics,
        )
    }

    #[cfg(feature = "redis")]
    fn default_bus(options: &WatcherOptions) -> Result<Arc<dyn Bus>> {
        Ok(Arc::new(crate::bus::RedisBus::from_options(options)?))
    }

    #[cfg(not(feature = "redis"))]
    fn default_bus(_options: &WatcherOptions) -> Result<Arc<dyn Bus>> {
        Err(crate::error::WatcherError::InvalidOptions(
            "no bus given and redis support is disabled".to_string(),
        ))
    }
}

impl Default for WatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
