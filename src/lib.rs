//! # policy-watcher
//!
//! Keeps replicated access-control policy in sync across processes by
//! broadcasting change notifications over a pub/sub channel.
//!
//! ## Overview
//!
//! Every process that holds a copy of the policy owns a [`Watcher`](core::Watcher).
//! After a local mutation the process announces it with one of the
//! `update_for_*` operations; every watcher on the same channel, the
//! publisher included, runs its callback so the host engine can apply the
//! change or reload the policy.
//!
//! - Structured JSON messages naming the mutation and the affected rules
//! - A plain-text ping for peers that only understand "something changed"
//! - A background subscriber that resubscribes after broker disconnects
//! - Callbacks swapped atomically with `arc-swap`
//! - Redis transport with a bb8 pool of publish connections, or any custom [`Bus`](bus::Bus)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use policy_watcher::prelude::*;
//!
//! # async fn example() -> policy_watcher::error::Result<()> {
//! let watcher = Watcher::new(WatcherOptions::new("127.0.0.1", 6379).with_channel("/casbin"))?;
//!
//! watcher.set_payload_callback(|payload| {
//!     match serde_json::from_str::<Message>(payload) {
//!         Ok(msg) => println!("peer change: {}", msg),
//!         Err(_) => println!("peer ping: {}", payload),
//!     }
//! });
//!
//! watcher
//!     .update_for_remove_policy("p", "p", vec!["alice".into(), "data1".into(), "read".into()])
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `redis` (default): Redis transport via `redis` and `bb8`
//! - `metrics`: OpenTelemetry counters for publishes, deliveries and reconnects
//!
//! ```toml
//! [dependencies]
//! policy-watcher = { version = "0.1", default-features = false, features = ["metrics"] }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod bus;
pub mod core;
pub mod error;
pub mod message;
pub mod notifier;
pub mod notify;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::bus::{Bus, MemoryBus};
    pub use crate::core::{OptionsLoader, PoolOptions, Watcher, WatcherBuilder, WatcherOptions};
    pub use crate::error::{Result, WatcherError};
    pub use crate::message::{Message, UpdateType};
    pub use crate::notifier::Notifier;
    pub use crate::notify::{Callback, SubscriptionState};

    #[cfg(feature = "redis")]
    pub use crate::bus::RedisBus;
}
