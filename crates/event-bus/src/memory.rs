use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::{BusError, Delivery, EventBus, EventHandler, Result};
use crate::envelope::EventEnvelope;
use crate::retry::RetryPolicy;

/// Topic that receives deliveries exhausted by the retry policy.
pub const DEAD_LETTER_TOPIC: &str = "dead-letter";

const DEFAULT_PARTITIONS: usize = 8;

struct GroupState {
    senders: Vec<mpsc::UnboundedSender<Delivery>>,
}

struct Inner {
    partitions: usize,
    retry: RetryPolicy,
    /// topic -> consumer group -> partition channels.
    topics: RwLock<HashMap<String, HashMap<String, GroupState>>>,
    /// Log of everything published, for test assertions.
    published: Mutex<Vec<(String, EventEnvelope)>>,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

/// In-process partitioned publish/subscribe bus.
///
/// Each (topic, group, partition) gets its own worker task consuming an
/// unbounded channel, so deliveries sharing a key are processed strictly
/// in publish order within a group, while different partitions run in
/// parallel. Messages published before a group subscribes are not
/// delivered to it, matching a broker consumer starting at the log tail.
///
/// Handler failures are retried per [`RetryPolicy`]; exhausted or
/// malformed deliveries are republished to [`DEAD_LETTER_TOPIC`].
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus with the default partition count and retry policy.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_PARTITIONS, RetryPolicy::default())
    }

    /// Creates a bus with explicit partition count and retry policy.
    pub fn with_options(partitions: usize, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                retry,
                topics: RwLock::new(HashMap::new()),
                published: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns every envelope published to `topic`, in publish order.
    pub fn published_on(&self, topic: &str) -> Vec<EventEnvelope> {
        self.inner
            .published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Returns how many events of `event_type` were published to `topic`.
    pub fn published_count(&self, topic: &str, event_type: &str) -> usize {
        self.published_on(topic)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Blocks until every delivered message (including messages published
    /// by handlers while processing) has been fully handled.
    ///
    /// Handlers publish before returning, so the in-flight counter only
    /// reaches zero once the causal chain has drained.
    pub async fn wait_until_idle(&self) {
        loop {
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                // Settle window for a worker that is between handler
                // return and counter decrement.
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }

    /// Drains in-flight deliveries, then refuses further publishes and
    /// stops all consumer workers.
    pub async fn shutdown(&self) {
        self.wait_until_idle().await;
        self.inner.closed.store(true, Ordering::Release);
        self.inner.topics.write().unwrap().clear();
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.inner.partitions
    }
}

impl Inner {
    fn publish_envelope(&self, topic: &str, partition: usize, envelope: EventEnvelope) {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), envelope.clone()));

        let topics = self.topics.read().unwrap();
        let Some(groups) = topics.get(topic) else {
            return;
        };

        for (group, state) in groups {
            let delivery = Delivery {
                topic: topic.to_string(),
                partition,
                envelope: envelope.clone(),
            };
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            if state.senders[partition].send(delivery).is_err() {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(topic, group, "consumer group worker gone, message dropped");
            }
        }
    }

    fn dead_letter(self: &Arc<Self>, delivery: &Delivery, reason: &str) {
        metrics::counter!("bus_messages_dead_lettered").increment(1);

        if delivery.topic == DEAD_LETTER_TOPIC {
            tracing::error!(
                event_type = %delivery.envelope.event_type,
                reason,
                "dead-letter delivery failed, dropping"
            );
            return;
        }

        tracing::error!(
            topic = %delivery.topic,
            event_type = %delivery.envelope.event_type,
            key = %delivery.envelope.key,
            reason,
            "delivery exhausted, routing to dead-letter topic"
        );

        let payload = serde_json::json!({
            "sourceTopic": delivery.topic,
            "reason": reason,
            "envelope": delivery.envelope,
        });
        let envelope = EventEnvelope::new("dead-lettered", delivery.envelope.key.clone(), payload);
        let partition = {
            let mut hasher = DefaultHasher::new();
            envelope.key.hash(&mut hasher);
            (hasher.finish() as usize) % self.partitions
        };
        self.publish_envelope(DEAD_LETTER_TOPIC, partition, envelope);
    }
}

async fn run_partition_worker(
    inner: Arc<Inner>,
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = rx.recv().await {
        process_delivery(&inner, handler.as_ref(), &delivery).await;
        inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn process_delivery(inner: &Arc<Inner>, handler: &dyn EventHandler, delivery: &Delivery) {
    let mut attempt: u32 = 1;
    loop {
        match handler.handle(delivery).await {
            Ok(()) => {
                metrics::counter!("bus_messages_handled").increment(1);
                return;
            }
            Err(e) if e.is_retryable() => match inner.retry.delay_before(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        topic = %delivery.topic,
                        event_type = %delivery.envelope.event_type,
                        attempt,
                        error = %e,
                        "handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    inner.dead_letter(delivery, &e.to_string());
                    return;
                }
            },
            Err(e) => {
                inner.dead_letter(delivery, &e.to_string());
                return;
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let envelope = EventEnvelope::new(event_type, key, payload);
        let partition = self.partition_for(key);

        tracing::debug!(topic, event_type, key, partition, "publishing event");
        metrics::counter!("bus_messages_published").increment(1);

        self.inner.publish_envelope(topic, partition, envelope);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let mut topics = self.inner.topics.write().unwrap();
        let groups = topics.entry(topic.to_string()).or_default();
        if groups.contains_key(group) {
            tracing::warn!(topic, group, "group already subscribed, ignoring");
            return Ok(());
        }

        let mut senders = Vec::with_capacity(self.inner.partitions);
        for _ in 0..self.inner.partitions {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            tokio::spawn(run_partition_worker(
                Arc::clone(&self.inner),
                Arc::clone(&handler),
                rx,
            ));
        }
        groups.insert(group.to_string(), GroupState { senders });

        tracing::info!(topic, group, "consumer group subscribed");
        Ok(())
    }
}
