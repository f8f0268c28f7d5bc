//! Core watcher types: options, loading, construction and the handle itself.

mod builder;
mod loader;
mod options;
mod watcher;

pub use builder::WatcherBuilder;
pub use loader::OptionsLoader;
pub use options::{
    DEFAULT_CHANNEL, DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_TIMEOUT_MS, PoolOptions, WatcherOptions,
};
pub use watcher::Watcher;
