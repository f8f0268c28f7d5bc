//! Inbound side of the watcher.
//!
//! Holds the user callbacks and the background loop that keeps a
//! subscription open and dispatches every delivered notification.

mod callback;
pub(crate) mod subscriber;

pub use callback::{Callback, CallbackRegistry};
pub use subscriber::SubscriptionState;
