//! Built-in metrics for watcher operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Publish attempts/failures and duration
//! - Received payloads and decode failures
//! - Subscription reconnects
//! - Time since the last received payload
//!
//! # Examples
//!
//! ```rust,no_run
//! use policy_watcher::prelude::*;
//! use policy_watcher::bus::MemoryBus;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let watcher = Watcher::builder()
//!     .with_bus(Arc::new(MemoryBus::new()))
//!     .with_metrics(global::meter("my-app"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod watcher_metrics;

pub use watcher_metrics::WatcherMetrics;
