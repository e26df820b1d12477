//! The Event Bus: ties the Subscription Table, History Store, and Channel
//! Broker together behind `publish`/`subscribe`/`unsubscribe`/`request`.
//!
//! Each subscription owns a bounded mpsc channel and a dedicated dispatch
//! task that drains it strictly in order, which is what gives per-subscription
//! FIFO delivery (property 2 in the spec's testable-properties list):
//! `publish` only has to hand the event to the channel, not wait for the
//! handler, and two events published in order can never be reordered before
//! a single handler sees them because they pass through the same channel.

use super::broker::{BrokerError, ChannelBroker, NullBroker};
use super::compression::maybe_compress;
use super::history::HistoryStore;
use super::pattern::Pattern;
use super::wire::WireEnvelope;
use super::{Event, PublishOptions, SubscribeOptions};
use crate::clock::{Clock, MonotonicClock};
use crate::config::EventBusConfig;
use crate::error::CoreError;
use crate::metrics::MetricsSink;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type SubscriptionHandle = Uuid;
pub type Handler = Arc<dyn Fn(Event) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct SubscriptionEntry {
    pattern: Pattern,
    namespace: String,
    sender: mpsc::Sender<Event>,
    dispatch_task: tokio::task::JoinHandle<()>,
}

/// A read-only view of a live subscription, returned by introspection APIs.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub pattern: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default)]
pub struct BusMetrics {
    pub total_events: u64,
    pub per_topic_counts: HashMap<String, u64>,
    pub subscriber_count: usize,
}

pub struct EventBus {
    config: EventBusConfig,
    subscriptions: RwLock<HashMap<SubscriptionHandle, SubscriptionEntry>>,
    history: HistoryStore,
    broker: Arc<dyn ChannelBroker>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
    total_events: AtomicU64,
    per_topic_counts: Mutex<HashMap<String, u64>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self::with_broker(config, metrics, Arc::new(NullBroker))
    }

    pub fn with_broker(config: EventBusConfig, metrics: Arc<dyn MetricsSink>, broker: Arc<dyn ChannelBroker>) -> Self {
        let history = HistoryStore::new(config.max_history_size, config.default_ttl);
        Self {
            config,
            subscriptions: RwLock::new(HashMap::new()),
            history,
            broker,
            metrics,
            clock: Arc::new(MonotonicClock::default()),
            closed: AtomicBool::new(false),
            total_events: AtomicU64::new(0),
            per_topic_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn publish(&self, topic: impl Into<String>, data: serde_json::Value, opts: PublishOptions) -> Result<Uuid, CoreError> {
        if self.is_closed() {
            return Err(CoreError::Closed { resource: "EventBus", id: Uuid::nil() });
        }

        let topic = topic.into();
        let namespace = opts.namespace.unwrap_or_default();
        let event = Event {
            id: Uuid::new_v4(),
            topic: topic.clone(),
            namespace: namespace.clone(),
            data,
            source: opts.source.unwrap_or_else(|| "system".to_string()),
            monotonic_millis: self.clock.now_millis(),
            wall_clock: std::time::SystemTime::now(),
        };

        self.history.record(event.clone(), opts.ttl);
        self.total_events.fetch_add(1, Ordering::Relaxed);
        *self.per_topic_counts.lock().expect("EventBus.per_topic_counts: lock poisoned").entry(topic.clone()).or_default() += 1;
        self.metrics.event_published(&namespace, &topic);

        if self.config.enable_persistence {
            if let Err(e) = self.relay_to_broker(&event).await {
                tracing::warn!(topic = %topic, namespace = %namespace, error = %e, "broker relay failed, continuing with local delivery");
            }
        }

        self.dispatch_locally(&event).await;
        Ok(event.id)
    }

    async fn relay_to_broker(&self, event: &Event) -> Result<(), BrokerError> {
        let serialized = serde_json::to_vec(event).map_err(|e| BrokerError(e.to_string()))?;
        let (body, compressed) = maybe_compress(&serialized, self.config.compression_threshold);
        let envelope = WireEnvelope::new(compressed, "application/json", Bytes::from(body));
        let channel = format!("{}:{}", event.namespace, event.topic);
        self.broker.publish(&channel, &envelope.encode()).await
    }

    async fn dispatch_locally(&self, event: &Event) {
        let matching: Vec<mpsc::Sender<Event>> = {
            let guard = self.subscriptions.read().expect("EventBus.subscriptions: lock poisoned");
            guard
                .values()
                .filter(|s| s.namespace == event.namespace && s.pattern.matches(&event.topic))
                .map(|s| s.sender.clone())
                .collect()
        };

        for sender in matching {
            if sender.send(event.clone()).await.is_err() {
                tracing::debug!(topic = %event.topic, "subscriber channel closed, dropping delivery");
            }
        }
    }

    pub async fn subscribe(&self, pattern: impl Into<String>, handler: Handler, opts: SubscribeOptions) -> Result<SubscriptionHandle, CoreError> {
        if self.is_closed() {
            return Err(CoreError::Closed { resource: "EventBus", id: Uuid::nil() });
        }

        let (tx, mut rx) = mpsc::channel(self.config.subscriber_channel_capacity.max(1));
        let dispatch_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event).await;
            }
        });

        let handle = Uuid::new_v4();
        let entry = SubscriptionEntry {
            pattern: Pattern::new(pattern.into()),
            namespace: opts.namespace.unwrap_or_default(),
            sender: tx,
            dispatch_task,
        };
        self.subscriptions.write().expect("EventBus.subscriptions: lock poisoned").insert(handle, entry);
        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(entry) = self.subscriptions.write().expect("EventBus.subscriptions: lock poisoned").remove(&handle) {
            entry.dispatch_task.abort();
        }
    }

    /// Publishes `topic` and awaits the first reply on a private
    /// `__reply.<id>` topic, or fails with `Timeout`. A responder that
    /// errors silently produces no reply, which looks identical to the
    /// caller as no responder existing at all.
    pub async fn request(&self, topic: impl Into<String>, data: serde_json::Value, timeout: Duration) -> Result<serde_json::Value, CoreError> {
        let correlation_id = Uuid::new_v4();
        let reply_topic = format!("__reply.{correlation_id}");

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let reply_handle = self
            .subscribe(
                reply_topic.clone(),
                Arc::new(move |event: Event| {
                    let tx = tx.clone();
                    Box::pin(async move {
                        if let Some(sender) = tx.lock().expect("request reply slot: lock poisoned").take() {
                            let _ = sender.send(event.data);
                        }
                    })
                }),
                SubscribeOptions::default(),
            )
            .await?;

        let envelope = serde_json::json!({ "data": data, "replyTo": reply_topic });
        self.publish(topic, envelope, PublishOptions::default()).await?;

        let result = tokio::time::timeout(timeout, rx).await;
        self.unsubscribe(reply_handle);

        match result {
            Ok(Ok(reply)) => Ok(reply),
            _ => Err(CoreError::Timeout { elapsed: timeout, limit: timeout }),
        }
    }

    pub fn get_history(&self, namespace: &str, topic: &str, limit: Option<usize>) -> Vec<Event> {
        self.history.get(namespace, topic, limit)
    }

    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .expect("EventBus.subscriptions: lock poisoned")
            .iter()
            .map(|(handle, entry)| Subscription {
                handle: *handle,
                pattern: entry.pattern.as_str().to_string(),
                namespace: entry.namespace.clone(),
            })
            .collect()
    }

    pub fn get_metrics(&self) -> BusMetrics {
        BusMetrics {
            total_events: self.total_events.load(Ordering::Relaxed),
            per_topic_counts: self.per_topic_counts.lock().expect("EventBus.per_topic_counts: lock poisoned").clone(),
            subscriber_count: self.subscriptions.read().expect("EventBus.subscriptions: lock poisoned").len(),
        }
    }

    /// Flushes pending deliveries (bounded by `eventBus.shutdownDeadline`),
    /// disconnects the broker, and drops every subscription. Further
    /// publishes fail with `Closed`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let entries: Vec<SubscriptionEntry> = {
            let mut guard = self.subscriptions.write().expect("EventBus.subscriptions: lock poisoned");
            guard.drain().map(|(_, v)| v).collect()
        };
        for entry in entries {
            drop(entry.sender);
            let _ = tokio::time::timeout(self.config.shutdown_deadline, entry.dispatch_task).await;
        }
        if let Err(e) = self.broker.close().await {
            tracing::warn!(error = %e, "broker close failed during event bus shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NullMetrics;
    use std::sync::atomic::AtomicUsize;

    fn bus() -> EventBus {
        EventBus::new(EventBusConfig::default(), Arc::new(NullMetrics))
    }

    #[tokio::test]
    async fn wildcard_fan_out_preserves_publish_order() {
        let bus = bus();
        let h1_seen = Arc::new(Mutex::new(Vec::new()));
        let h2_seen = Arc::new(Mutex::new(Vec::new()));

        let h1_clone = h1_seen.clone();
        bus.subscribe(
            "test.*",
            Arc::new(move |e: Event| {
                let h1_clone = h1_clone.clone();
                Box::pin(async move { h1_clone.lock().unwrap().push(e.data) })
            }),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

        let h2_clone = h2_seen.clone();
        bus.subscribe(
            "test.event1",
            Arc::new(move |e: Event| {
                let h2_clone = h2_clone.clone();
                Box::pin(async move { h2_clone.lock().unwrap().push(e.data) })
            }),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

        bus.publish("test.event1", serde_json::json!({"id": 1}), PublishOptions::default()).await.unwrap();
        bus.publish("test.event2", serde_json::json!({"id": 2}), PublishOptions::default()).await.unwrap();
        bus.publish("other.event", serde_json::json!({"id": 3}), PublishOptions::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let h1 = h1_seen.lock().unwrap().clone();
        assert_eq!(h1, vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})]);
        let h2 = h2_seen.lock().unwrap().clone();
        assert_eq!(h2, vec![serde_json::json!({"id": 1})]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let handle = bus
            .subscribe(
                "topic",
                Arc::new(move |_e: Event| {
                    let calls_clone = calls_clone.clone();
                    Box::pin(async move { calls_clone.fetch_add(1, Ordering::SeqCst); })
                }),
                SubscribeOptions::default(),
            )
            .await
            .unwrap();

        bus.publish("topic", serde_json::json!(null), PublishOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.unsubscribe(handle);
        bus.publish("topic", serde_json::json!(null), PublishOptions::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_times_out_without_responder() {
        let bus = bus();
        let start = tokio::time::Instant::now();
        let result = bus.request("no.response", serde_json::json!({"data": "x"}), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CoreError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(bus.get_metrics().subscriber_count, 0, "reply subscription must be cleaned up");
    }

    #[tokio::test]
    async fn request_receives_reply() {
        let bus = Arc::new(bus());
        let responder_bus = bus.clone();
        bus.subscribe(
            "ping",
            Arc::new(move |e: Event| {
                let responder_bus = responder_bus.clone();
                Box::pin(async move {
                    let reply_to = e.data["replyTo"].as_str().unwrap().to_string();
                    responder_bus.publish(reply_to, serde_json::json!("pong"), PublishOptions::default()).await.unwrap();
                })
            }),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

        let reply = bus.request("ping", serde_json::json!("hi"), Duration::from_millis(500)).await.unwrap();
        assert_eq!(reply, serde_json::json!("pong"));
    }

    #[tokio::test]
    async fn history_is_bounded_and_oldest_first() {
        let mut config = EventBusConfig::default();
        config.max_history_size = 10;
        let bus = EventBus::new(config, Arc::new(NullMetrics));

        for i in 0..15 {
            bus.publish("overflow.test", serde_json::json!({"id": i}), PublishOptions::default()).await.unwrap();
        }

        let history = bus.get_history("", "overflow.test", None);
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().data["id"], 5);
        assert_eq!(history.last().unwrap().data["id"], 14);
    }

    #[tokio::test]
    async fn closed_bus_rejects_publish() {
        let bus = bus();
        bus.close().await;
        let err = bus.publish("topic", serde_json::json!(null), PublishOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Closed { .. }));
    }

    #[tokio::test]
    async fn namespace_isolation() {
        let bus = bus();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        bus.subscribe(
            "topic",
            Arc::new(move |_e: Event| {
                let calls_clone = calls_clone.clone();
                Box::pin(async move { calls_clone.fetch_add(1, Ordering::SeqCst); })
            }),
            SubscribeOptions { namespace: Some("a".to_string()), ordered: false },
        )
        .await
        .unwrap();

        bus.publish("topic", serde_json::json!(null), PublishOptions { namespace: Some("b".to_string()), ..Default::default() }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.publish("topic", serde_json::json!(null), PublishOptions { namespace: Some("a".to_string()), ..Default::default() }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
