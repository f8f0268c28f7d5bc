//! Watcher metrics tracking using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for watcher operations.
///
/// Tracks publish attempts and failures, publish latency, inbound messages,
/// decode failures and subscription reconnects using OpenTelemetry metrics.
///
/// # Examples
///
/// ```rust,no_run
/// use policy_watcher::metrics::WatcherMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("policy-watcher");
/// let metrics = WatcherMetrics::new(meter);
///
/// // Track a publish
/// let timer = metrics.start_publish();
/// // ... publish ...
/// metrics.record_publish_success(timer);
/// ```
#[derive(Clone)]
pub struct WatcherMetrics {
    publish_attempts: Counter<u64>,
    publish_failures: Counter<u64>,
    publish_duration: Histogram<f64>,
    messages_received: Counter<u64>,
    decode_failures: Counter<u64>,
    reconnects: Counter<u64>,
    last_received_age: Gauge<i64>,
    last_received: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl WatcherMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let publish_attempts = meter
            .u64_counter("policy_watcher.publish.attempts")
            .with_description("Total number of publish attempts")
            .build();

        let publish_failures = meter
            .u64_counter("policy_watcher.publish.failures")
            .with_description("Number of publishes that failed and were dropped")
            .build();

        let publish_duration = meter
            .f64_histogram("policy_watcher.publish.duration")
            .with_description("Duration of publish operations in seconds")
            .with_unit("s")
            .build();

        let messages_received = meter
            .u64_counter("policy_watcher.messages.received")
            .with_description("Payloads received on the channel")
            .build();

        let decode_failures = meter
            .u64_counter("policy_watcher.messages.decode_failures")
            .with_description("Received payloads that could not be decoded")
            .build();

        let reconnects = meter
            .u64_counter("policy_watcher.subscription.reconnects")
            .with_description("Subscription attempts after a failure or disconnect")
            .build();

        let last_received_age = meter
            .i64_gauge("policy_watcher.messages.age")
            .with_description("Time since the last received payload in seconds")
            .with_unit("s")
            .build();

        Self {
            publish_attempts,
            publish_failures,
            publish_duration,
            messages_received,
            decode_failures,
            reconnects,
            last_received_age,
            last_received: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Start a publish timer.
    ///
    /// Pass the returned `Instant` to `record_publish_success` or
    /// `record_publish_failure` when the publish completes.
    pub fn start_publish(&self) -> Instant {
        self.publish_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a successful publish.
    pub fn record_publish_success(&self, start: Instant) {
        self.publish_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a failed publish.
    ///
    /// # Arguments
    ///
    /// * `start` - The `Instant` returned from `start_publish()`
    /// * `kind` - Wire name of the message kind that was dropped
    pub fn record_publish_failure(&self, start: Instant, kind: &'static str) {
        self.publish_failures.add(1, &[KeyValue::new("kind", kind)]);
        self.publish_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a payload received on the channel.
    pub fn record_received(&self) {
        self.messages_received.add(1, &[]);
        *self.last_received.lock() = Some(Instant::now());
    }

    /// Record a payload that failed to decode.
    pub fn record_decode_failure(&self) {
        self.decode_failures.add(1, &[]);
    }

    /// Record a subscription retry.
    pub fn record_reconnect(&self) {
        self.reconnects.add(1, &[]);
    }

    /// Report how long ago the last payload arrived.
    ///
    /// Call periodically; nothing is recorded until a payload has arrived.
    pub fn update_received_age(&self) {
        if let Some(at) = *self.last_received.lock() {
            self.last_received_age.record(at.elapsed().as_secs() as i64, &[]);
        }
    }
}
