//! The watcher handle shared by the host policy engine.

use crate::bus::Bus;
use crate::core::WatcherBuilder;
use crate::error::{Result, WatcherError};
use crate::message::{Message, UpdateType, codec};
use crate::notify::subscriber::SubscriberLoop;
use crate::notify::{Callback, CallbackRegistry, SubscriptionState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

#[cfg(feature = "redis")]
use crate::core::WatcherOptions;

/// Announces local policy changes to peers and runs callbacks for the
/// changes they announce.
///
/// A watcher owns one background subscriber task on its channel. Every
/// notification delivered on the channel, including the watcher's own
/// publishes, is handed to the installed callbacks. The publish operations
/// never fail: transport errors are logged and the notification is dropped,
/// because the local policy change has already happened.
///
/// Cloning is cheap and every clone drives the same task. The task stops when
/// [`close`](Self::close) is called or the last clone is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use policy_watcher::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<()> {
/// let watcher = Watcher::builder()
///     .with_bus(Arc::new(MemoryBus::new()))
///     .with_channel("casbin-dev")
///     .build()?;
///
/// watcher.set_update_callback(|| println!("policy changed, reloading"));
///
/// watcher
///     .update_for_add_policy("p", "p", vec!["alice".into(), "data1".into(), "read".into()])
///     .await;
///
/// watcher.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

struct Inner {
    /// Random per-instance id stamped on outbound messages
    id: String,
    channel: String,
    bus: Arc<dyn Bus>,
    callbacks: Arc<CallbackRegistry>,
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    task: Mutex<Option<JoinHandle<()>>>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatcherMetrics>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Watcher {
    /// Create a builder for configuring a watcher.
    pub fn builder() -> WatcherBuilder {
        WatcherBuilder::new()
    }

    /// Start a Redis-backed watcher from options.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or no Tokio runtime is running.
    #[cfg(feature = "redis")]
    pub fn new(options: WatcherOptions) -> Result<Self> {
        WatcherBuilder::new().with_options(options).build()
    }

    /// Spawn the subscriber loop and wrap it in a handle.
    pub(crate) fn start(
        bus: Arc<dyn Bus>,
        channel: String,
        reconnect_interval: Duration,
        #[cfg(feature = "metrics")] metrics: Option<WatcherMetrics>,
    ) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| WatcherError::RuntimeError(format!("watcher needs a Tokio runtime: {}", e)))?;

        let id = uuid::Uuid::new_v4().to_string();
        let callbacks = Arc::new(CallbackRegistry::new());
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(SubscriptionState::Connecting);

        let task = SubscriberLoop {
            bus: Arc::clone(&bus),
            channel: channel.clone(),
            callbacks: Arc::clone(&callbacks),
            cancel: cancel.clone(),
            reconnect_interval,
            state: state_tx,
            #[cfg(feature = "metrics")]
            metrics: metrics.clone(),
        }
        .spawn(&handle);

        info!(id = %id, channel = %channel, bus = %bus.name(), "watcher started");

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                channel,
                bus,
                callbacks,
                cancel,
                state,
                task: Mutex::new(Some(task)),
                #[cfg(feature = "metrics")]
                metrics,
            }),
        })
    }

    /// The id stamped on every message this watcher publishes.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The channel this watcher publishes and listens on.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Current state of the subscriber loop.
    pub fn subscription_state(&self) -> SubscriptionState {
        *self.inner.state.borrow()
    }

    /// Whether the watcher has not been closed.
    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    /// Wait until the subscriber loop is listening on the channel.
    ///
    /// Notifications published before the subscription is open are not
    /// delivered to this watcher, so callers that publish right after
    /// construction can wait here first.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::ConnectionError`] if the subscription is not
    /// open within `timeout`, or [`WatcherError::Closed`] if the loop exited.
    pub async fn wait_until_subscribed(&self, timeout: Duration) -> Result<()> {
        let mut state = self.inner.state.clone();
        let waited = tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s != SubscriptionState::Connecting),
        )
        .await
        .map_err(|_| {
            WatcherError::ConnectionError(format!("not subscribed after {}ms", timeout.as_millis()))
        })?
        .map(|s| *s);

        match waited {
            Ok(SubscriptionState::Subscribed) => Ok(()),
            _ => Err(WatcherError::Closed),
        }
    }

    /// Install the zero-argument callback, replacing any previous one.
    pub fn set_update_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_callback(Callback::notify(callback));
    }

    /// Install the payload callback, replacing any previous one.
    ///
    /// The callback receives the raw payload text: the JSON message, or the
    /// plain ping line for [`update`](Self::update).
    pub fn set_payload_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.set_callback(Callback::payload(callback));
    }

    /// Install a callback of either shape.
    pub fn set_callback(&self, callback: Callback) {
        debug!(id = %self.inner.id, ?callback, "callback installed");
        self.inner.callbacks.set(callback);
    }

    /// Remove all installed callbacks. Deliveries continue but run nothing.
    pub fn clear_callbacks(&self) {
        self.inner.callbacks.clear();
    }

    /// Announce that the policy changed, without details.
    ///
    /// Sends the plain ping line understood by older peers instead of a JSON
    /// message.
    pub async fn update(&self) {
        let payload = codec::ping_payload(&self.inner.id).into_bytes();
        self.publish_logged(UpdateType::Ping, Ok(payload)).await;
    }

    /// Announce an added rule.
    pub async fn update_for_add_policy(&self, sec: &str, ptype: &str, rule: Vec<String>) {
        self.publish(Message::add_policy(self.id(), sec, ptype, rule)).await;
    }

    /// Announce a removed rule.
    pub async fn update_for_remove_policy(&self, sec: &str, ptype: &str, rule: Vec<String>) {
        self.publish(Message::remove_policy(self.id(), sec, ptype, rule)).await;
    }

    /// Announce that every rule matching `field_values` from `field_index` on was removed.
    pub async fn update_for_remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: i32,
        field_values: Vec<String>,
    ) {
        self.publish(Message::remove_filtered_policy(
            self.id(),
            sec,
            ptype,
            field_index,
            field_values,
        ))
        .await;
    }

    /// Announce that the whole policy was saved.
    pub async fn update_for_save_policy(&self) {
        self.publish(Message::save_policy(self.id())).await;
    }

    /// Announce a batch of added rules.
    pub async fn update_for_add_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) {
        self.publish(Message::add_policies(self.id(), sec, ptype, rules)).await;
    }

    /// Announce a batch of removed rules.
    pub async fn update_for_remove_policies(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) {
        self.publish(Message::remove_policies(self.id(), sec, ptype, rules)).await;
    }

    /// Announce that `old_rule` was replaced by `new_rule`.
    pub async fn update_for_update_policy(
        &self,
        sec: &str,
        ptype: &str,
        old_rule: Vec<String>,
        new_rule: Vec<String>,
    ) {
        self.publish(Message::update_policy(self.id(), sec, ptype, old_rule, new_rule))
            .await;
    }

    /// Announce that `old_rules` were replaced by `new_rules`.
    pub async fn update_for_update_policies(
        &self,
        sec: &str,
        ptype: &str,
        old_rules: Vec<Vec<String>>,
        new_rules: Vec<Vec<String>>,
    ) {
        self.publish(Message::update_policies(self.id(), sec, ptype, old_rules, new_rules))
            .await;
    }

    /// Publish a message and report the outcome.
    ///
    /// Unlike the `update_for_*` operations this surfaces failures. The
    /// message is sent as given; its `id` is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The watcher has been closed
    /// - The message cannot be encoded
    /// - The bus rejects the publish
    pub async fn try_publish(&self, msg: &Message) -> Result<()> {
        let payload = codec::encode(msg)?;
        self.send(payload).await
    }

    /// Stop the subscriber loop and wait for it to exit.
    ///
    /// Idempotent. Publishing after close fails with [`WatcherError::Closed`],
    /// which the `update_for_*` operations log and absorb.
    pub async fn close(&self) {
        self.inner.cancel.cancel();

        let task = match self.inner.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(id = %self.inner.id, error = %e, "subscriber task ended abnormally");
            }
            info!(id = %self.inner.id, channel = %self.inner.channel, "watcher closed");
        }
    }

    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(WatcherError::Closed);
        }
        self.inner.bus.publish(&self.inner.channel, payload).await
    }

    async fn publish(&self, msg: Message) {
        let payload = codec::encode(&msg);
        self.publish_logged(msg.method, payload).await;
    }

    async fn publish_logged(&self, kind: UpdateType, payload: Result<Vec<u8>>) {
        #[cfg(feature = "metrics")]
        let started = self.inner.metrics.as_ref().map(|m| m.start_publish());

        let result = match payload {
            Ok(payload) => self.send(payload).await,
            Err(e) => Err(e),
        };

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(started)) = (&self.inner.metrics, started) {
            match &result {
                Ok(()) => metrics.record_publish_success(started),
                Err(_) => metrics.record_publish_failure(started, kind.as_str()),
            }
        }

        match result {
            Ok(()) => debug!(channel = %self.inner.channel, %kind, "notification published"),
            Err(e) => warn!(
                channel = %self.inner.channel,
                %kind,
                error = %e,
                "notification dropped"
            ),
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel)
            .field("bus", &self.inner.bus.name())
            .field("state", &self.subscription_state())
            .field("callbacks", &self.inner.callbacks)
            .finish()
    }
}
