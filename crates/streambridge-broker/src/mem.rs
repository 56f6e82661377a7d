//! In-process broker implementation.
//!
//! `InMemoryBroker` stands in for a real broker cluster the same way the
//! platform's local filesystem mode stands in for S3: identical interface,
//! no external process. Tests use it to drive delivery, commit, and failure
//! paths deterministically; the development server uses it so the proxy can
//! run end-to-end on a laptop.
//!
//! Offsets are monotonic per partition and delivery order per partition is
//! preserved. `inject_error` pushes an error event at every live binding of
//! a topic, which is how tests exercise the proxy's recovery state machine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::client::{BrokerClient, ConsumerBinding, Subscription};
use crate::error::{BrokerError, Result};
use crate::types::{BindingEvent, DeliveredRecord, SubscribeOptions};

/// Events buffered per binding before delivery backpressure kicks in.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

type CommitKey = (String, String, u32);

#[derive(Default)]
struct TopicState {
    /// Next offset to assign, per partition.
    next_offsets: Vec<i64>,
    subscribers: Vec<Arc<MemBinding>>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
}

/// An in-process [`BrokerClient`].
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    /// Committed offsets, shared with bindings: (group, topic, partition) →
    /// next offset to consume.
    committed: Arc<Mutex<HashMap<CommitKey, i64>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            committed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create `topic` with `partitions` partitions. Creating an existing
    /// topic is a no-op.
    pub async fn create_topic(&self, topic: &str, partitions: u32) {
        let mut state = self.state.lock().await;
        state.topics.entry(topic.to_string()).or_insert_with(|| TopicState {
            next_offsets: vec![0; partitions.max(1) as usize],
            subscribers: Vec::new(),
        });
    }

    /// Append a record to `topic`/`partition` and fan it out to every live
    /// binding subscribed to the topic. Returns the assigned offset.
    pub async fn publish(
        &self,
        topic: &str,
        partition: u32,
        key: Option<Bytes>,
        value: Bytes,
    ) -> Result<i64> {
        let mut state = self.state.lock().await;
        let topic_state = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        let slot = topic_state
            .next_offsets
            .get_mut(partition as usize)
            .ok_or_else(|| {
                BrokerError::Transport(format!(
                    "partition {partition} out of range for topic '{topic}'"
                ))
            })?;
        let offset = *slot;
        *slot += 1;

        let record = DeliveredRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key,
            value,
        };

        topic_state.subscribers.retain(|b| !b.is_closed());
        for binding in &topic_state.subscribers {
            binding.deliver(record.clone()).await;
        }

        Ok(offset)
    }

    /// Push an error event at every live binding of `topic`. Test and
    /// fault-injection hook for the proxy's recovery path.
    pub async fn inject_error(&self, topic: &str, reason: &str) {
        let mut state = self.state.lock().await;
        if let Some(topic_state) = state.topics.get_mut(topic) {
            topic_state.subscribers.retain(|b| !b.is_closed());
            for binding in &topic_state.subscribers {
                binding.fail(reason).await;
            }
        }
    }

    /// Number of live bindings currently subscribed to `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let mut state = self.state.lock().await;
        match state.topics.get_mut(topic) {
            Some(topic_state) => {
                topic_state.subscribers.retain(|b| !b.is_closed());
                topic_state.subscribers.len()
            }
            None => 0,
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn subscribe(
        &self,
        group: &str,
        topic: &str,
        _options: &SubscribeOptions,
    ) -> Result<Subscription> {
        let mut state = self.state.lock().await;
        let topic_state =
            state
                .topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::SubscribeFailed {
                    group: group.to_string(),
                    topic: topic.to_string(),
                    reason: "unknown topic".to_string(),
                })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let binding = Arc::new(MemBinding {
            group: group.to_string(),
            topic: topic.to_string(),
            inner: Mutex::new(MemBindingState {
                tx: Some(tx),
                positions: HashMap::new(),
            }),
            committed: Arc::clone(&self.committed),
        });
        topic_state.subscribers.push(Arc::clone(&binding));
        debug!(group, topic, "in-memory broker: subscription opened");

        Ok(Subscription {
            binding,
            events: rx,
        })
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.topics.contains_key(topic))
    }

    async fn fetch_offset(&self, group: &str, topic: &str, partition: u32) -> Result<i64> {
        let exists = self.topic_exists(topic).await?;
        if !exists {
            return Err(BrokerError::OffsetFetchFailed {
                group: group.to_string(),
                topic: topic.to_string(),
                partition,
                reason: "unknown topic".to_string(),
            });
        }
        let committed = self.committed.lock().await;
        Ok(committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(-1))
    }
}

struct MemBindingState {
    /// Present while the binding is open; dropped on close so the event
    /// channel closes and the consumer side observes the fence.
    tx: Option<mpsc::Sender<BindingEvent>>,
    /// Next offset to consume per partition, advanced on delivery.
    positions: HashMap<u32, i64>,
}

struct MemBinding {
    group: String,
    topic: String,
    inner: Mutex<MemBindingState>,
    committed: Arc<Mutex<HashMap<CommitKey, i64>>>,
}

impl MemBinding {
    fn is_closed(&self) -> bool {
        // try_lock never contends for long here; treat a locked state as
        // still open and let the next sweep prune it.
        match self.inner.try_lock() {
            Ok(state) => state.tx.is_none(),
            Err(_) => false,
        }
    }

    async fn deliver(&self, record: DeliveredRecord) {
        let mut state = self.inner.lock().await;
        let partition = record.partition;
        let offset = record.offset;
        let Some(tx) = state.tx.clone() else {
            return;
        };
        match tx.try_send(BindingEvent::Message(record)) {
            Ok(()) => {
                state.positions.insert(partition, offset + 1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    group = %self.group,
                    topic = %self.topic,
                    "in-memory broker: event channel full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn fail(&self, reason: &str) {
        let state = self.inner.lock().await;
        if let Some(tx) = state.tx.as_ref() {
            let _ = tx.try_send(BindingEvent::Error(reason.to_string()));
        }
    }

    async fn commit_positions(&self) -> Result<()> {
        let state = self.inner.lock().await;
        if state.tx.is_none() {
            return Err(BrokerError::CommitFailed("binding is closed".to_string()));
        }
        let mut committed = self.committed.lock().await;
        for (partition, next) in &state.positions {
            committed.insert(
                (self.group.clone(), self.topic.clone(), *partition),
                *next,
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ConsumerBinding for MemBinding {
    async fn commit(&self, _commit_all: bool) -> Result<()> {
        self.commit_positions().await
    }

    async fn close(&self, graceful: bool) -> Result<()> {
        if graceful {
            // Flush offsets before tearing down, ignoring a close race.
            let _ = self.commit_positions().await;
        }
        let mut state = self.inner.lock().await;
        state.tx = None;
        debug!(group = %self.group, topic = %self.topic, "in-memory broker: binding closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_assigns_monotonic_offsets_per_partition() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t1", 2).await;

        assert_eq!(broker.publish("t1", 0, None, Bytes::from("a")).await.unwrap(), 0);
        assert_eq!(broker.publish("t1", 0, None, Bytes::from("b")).await.unwrap(), 1);
        assert_eq!(broker.publish("t1", 1, None, Bytes::from("c")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_fails() {
        let broker = InMemoryBroker::new();
        let err = broker.publish("nope", 0, None, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, BrokerError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn subscriber_receives_published_records_in_order() {
        let broker = InMemoryBroker::new();
        broker.create_topic("orders", 1).await;

        let mut sub = broker
            .subscribe("g1", "orders", &SubscribeOptions::default())
            .await
            .unwrap();

        broker.publish("orders", 0, None, Bytes::from("first")).await.unwrap();
        broker.publish("orders", 0, None, Bytes::from("second")).await.unwrap();

        let first = sub.events.recv().await.unwrap();
        let second = sub.events.recv().await.unwrap();
        match (first, second) {
            (BindingEvent::Message(a), BindingEvent::Message(b)) => {
                assert_eq!(a.value, Bytes::from("first"));
                assert_eq!(a.offset, 0);
                assert_eq!(b.value, Bytes::from("second"));
                assert_eq!(b.offset, 1);
            }
            other => panic!("expected two message events, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_fences_the_event_channel() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t", 1).await;

        let mut sub = broker
            .subscribe("g", "t", &SubscribeOptions::default())
            .await
            .unwrap();
        sub.binding.close(false).await.unwrap();

        broker.publish("t", 0, None, Bytes::from("late")).await.unwrap();
        // Channel is closed and empty: no late delivery after the close ack.
        assert!(sub.events.recv().await.is_none());
        assert_eq!(broker.subscriber_count("t").await, 0);
    }

    #[tokio::test]
    async fn commit_records_positions_and_fetch_offset_reads_them() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t", 1).await;

        let sub = broker
            .subscribe("g", "t", &SubscribeOptions::default())
            .await
            .unwrap();

        assert_eq!(broker.fetch_offset("g", "t", 0).await.unwrap(), -1);

        broker.publish("t", 0, None, Bytes::from("x")).await.unwrap();
        broker.publish("t", 0, None, Bytes::from("y")).await.unwrap();
        sub.binding.commit(true).await.unwrap();

        assert_eq!(broker.fetch_offset("g", "t", 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn commit_after_close_fails() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t", 1).await;

        let sub = broker
            .subscribe("g", "t", &SubscribeOptions::default())
            .await
            .unwrap();
        sub.binding.close(false).await.unwrap();

        let err = sub.binding.commit(true).await.unwrap_err();
        assert!(matches!(err, BrokerError::CommitFailed(_)));
    }

    #[tokio::test]
    async fn inject_error_reaches_live_bindings() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t", 1).await;

        let mut sub = broker
            .subscribe("g", "t", &SubscribeOptions::default())
            .await
            .unwrap();
        broker.inject_error("t", "boom").await;

        match sub.events.recv().await.unwrap() {
            BindingEvent::Error(reason) => assert_eq!(reason, "boom"),
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
