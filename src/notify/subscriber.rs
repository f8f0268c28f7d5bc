//! Background task that listens on the channel and dispatches callbacks.

use crate::bus::Bus;
use crate::error::WatcherError;
use crate::message::codec;
use crate::notify::CallbackRegistry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

/// Where the subscriber loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Trying to open the subscription, or waiting to retry.
    Connecting,
    /// Listening on the channel.
    Subscribed,
    /// The loop has exited after cancellation.
    Stopped,
}

/// Everything the subscriber task owns.
///
/// The task never exits on a bus error: a failed subscribe, or a stream
/// that ends because the broker dropped the connection, sends it back to
/// connecting after `reconnect_interval`. Only cancellation stops it, and
/// that is checked while connecting, while waiting between attempts and
/// while waiting for the next payload.
pub(crate) struct SubscriberLoop {
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) channel: String,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) cancel: CancellationToken,
    pub(crate) reconnect_interval: Duration,
    pub(crate) state: watch::Sender<SubscriptionState>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<WatcherMetrics>,
}

impl SubscriberLoop {
    /// Start the loop on the given runtime.
    pub(crate) fn spawn(self, handle: &tokio::runtime::Handle) -> JoinHandle<()> {
        handle.spawn(self.run())
    }

    async fn run(self) {
        let mut attempts: u64 = 0;

        'connect: loop {
            self.state.send_replace(SubscriptionState::Connecting);

            if attempts > 0 {
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_reconnect();
                }
                if !self.pause().await {
                    break 'connect;
                }
            }
            attempts += 1;

            let subscribed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break 'connect,
                result = self.bus.subscribe(&self.channel) => result,
            };

            let mut stream = match subscribed {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(
                        channel = %self.channel,
                        bus = %self.bus.name(),
                        attempt = attempts,
                        error = %err,
                        "subscribe failed, retrying"
                    );
                    continue 'connect;
                }
            };

            info!(channel = %self.channel, bus = %self.bus.name(), "subscribed to policy channel");
            self.state.send_replace(SubscriptionState::Subscribed);

            loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'connect,
                    next = stream.next() => next,
                };

                match next {
                    Some(payload) => self.handle(&payload),
                    None => {
                        let err = WatcherError::SubscriptionError("stream closed by the bus".to_string());
                        warn!(channel = %self.channel, error = %err, "resubscribing");
                        continue 'connect;
                    }
                }
            }
        }

        self.state.send_replace(SubscriptionState::Stopped);
        debug!(channel = %self.channel, "subscriber loop stopped");
    }

    /// Wait out the reconnect interval. Returns `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = sleep(self.reconnect_interval) => true,
        }
    }

    fn handle(&self, payload: &[u8]) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_received();
        }

        // The zero-argument callback runs for anything received; only the
        // payload callback needs a recognizable message.
        let recognized = if let Some(origin) = codec::parse_ping(payload) {
            debug!(channel = %self.channel, origin, "received update ping");
            true
        } else {
            match codec::decode(payload) {
                Ok(msg) => {
                    debug!(
                        channel = %self.channel,
                        kind = %msg.method,
                        origin = %msg.id,
                        "received policy change"
                    );
                    true
                }
                Err(err) => {
                    #[cfg(feature = "metrics")]
                    if let Some(metrics) = &self.metrics {
                        metrics.record_decode_failure();
                    }
                    warn!(
                        channel = %self.channel,
                        error = %err,
                        "undecodable payload, running update callback only"
                    );
                    false
                }
            }
        };

        let dispatched = catch_unwind(AssertUnwindSafe(|| {
            if recognized {
                self.callbacks.dispatch(&String::from_utf8_lossy(payload))
            } else {
                self.callbacks.dispatch_notify()
            }
        }));
        if dispatched.is_err() {
            error!(channel = %self.channel, "watcher callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::message::Message;
    use crate::notify::Callback;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    struct Harness {
        bus: Arc<MemoryBus>,
        callbacks: Arc<CallbackRegistry>,
        cancel: CancellationToken,
        state: watch::Receiver<SubscriptionState>,
        task: JoinHandle<()>,
    }

    fn start(bus: Arc<MemoryBus>) -> Harness {
        let callbacks = Arc::new(CallbackRegistry::new());
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(SubscriptionState::Connecting);
        let task = SubscriberLoop {
            bus: bus.clone(),
            channel: "test".to_string(),
            callbacks: Arc::clone(&callbacks),
            cancel: cancel.clone(),
            reconnect_interval: Duration::from_millis(20),
            state: state_tx,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
        .spawn(&tokio::runtime::Handle::current());

        Harness {
            bus,
            callbacks,
            cancel,
            state,
            task,
        }
    }

    async fn wait_subscribed(harness: &mut Harness) {
        timeout(
            Duration::from_secs(2),
            harness.state.wait_for(|s| *s == SubscriptionState::Subscribed),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_dispatches_decoded_messages() {
        let mut harness = start(Arc::new(MemoryBus::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        harness
            .callbacks
            .set(Callback::payload(move |p| seen_clone.lock().unwrap().push(p.to_string())));
        wait_subscribed(&mut harness).await;

        let payload = codec::encode(&Message::save_policy("peer")).unwrap();
        harness.bus.publish("test", payload.clone()).await.unwrap();

        timeout(Duration::from_secs(2), async {
            while seen.lock().unwrap().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(seen.lock().unwrap()[0].as_bytes(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_garbage_runs_update_callback_only() {
        let mut harness = start(Arc::new(MemoryBus::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        harness.callbacks.set(Callback::notify(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        harness
            .callbacks
            .set(Callback::payload(move |p| seen_clone.lock().unwrap().push(p.to_string())));
        wait_subscribed(&mut harness).await;

        harness
            .bus
            .publish("test", br#"{"method":"UpdateForRemovePoliciesV2","id":"peer"}"#.to_vec())
            .await
            .unwrap();
        harness.bus.publish("test", b"policy changed".to_vec()).await.unwrap();
        harness.bus.publish("test", vec![0xff, 0x00, 0x13]).await.unwrap();
        harness
            .bus
            .publish("test", codec::ping_payload("peer").into_bytes())
            .await
            .unwrap();

        timeout(Duration::from_secs(2), async {
            while hits.load(Ordering::SeqCst) < 4 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(*seen.lock().unwrap(), vec![codec::ping_payload("peer")]);
        assert!(!harness.task.is_finished());
    }

    #[tokio::test]
    async fn test_survives_panicking_callback() {
        let mut harness = start(Arc::new(MemoryBus::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        harness.callbacks.set(Callback::notify(move || {
            if hits_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first delivery fails");
            }
        }));
        wait_subscribed(&mut harness).await;

        let ping = codec::ping_payload("peer").into_bytes();
        harness.bus.publish("test", ping.clone()).await.unwrap();
        harness.bus.publish("test", ping).await.unwrap();

        timeout(Duration::from_secs(2), async {
            while hits.load(Ordering::SeqCst) < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!harness.task.is_finished());
    }

    #[tokio::test]
    async fn test_retries_until_bus_comes_back() {
        let bus = Arc::new(MemoryBus::new());
        bus.set_online(false);
        let mut harness = start(bus);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(*harness.state.borrow(), SubscriptionState::Connecting);

        harness.bus.set_online(true);
        wait_subscribed(&mut harness).await;
        assert_eq!(harness.bus.subscriber_count("test"), 1);
    }

    #[tokio::test]
    async fn test_resubscribes_after_disconnect() {
        let mut harness = start(Arc::new(MemoryBus::new()));
        wait_subscribed(&mut harness).await;
        assert_eq!(harness.bus.subscriptions_opened(), 1);

        harness.bus.disconnect_subscribers();

        timeout(Duration::from_secs(2), async {
            while harness.bus.subscriptions_opened() < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(harness.bus.subscriber_count("test"), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_loop_and_releases_subscription() {
        let mut harness = start(Arc::new(MemoryBus::new()));
        wait_subscribed(&mut harness).await;

        harness.cancel.cancel();
        timeout(Duration::from_secs(2), &mut harness.task).await.unwrap().unwrap();

        assert_eq!(*harness.state.borrow(), SubscriptionState::Stopped);
        assert_eq!(harness.bus.subscriber_count("test"), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_offline() {
        let bus = Arc::new(MemoryBus::new());
        bus.set_online(false);
        let mut harness = start(bus);

        sleep(Duration::from_millis(30)).await;
        harness.cancel.cancel();
        timeout(Duration::from_secs(2), &mut harness.task).await.unwrap().unwrap();
    }
}
