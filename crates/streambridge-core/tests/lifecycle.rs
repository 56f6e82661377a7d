//! Integration tests for the session lifecycle manager.
//!
//! These drive the manager against the in-memory broker and cover the full
//! lifecycle: creation, first topic access, buffering and drain-all polls,
//! auto and explicit commits, error recovery, deletion, and idle eviction.
//!
//! All tests run with a paused clock, so settling delays, recovery backoffs,
//! and idle windows elapse deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use streambridge_broker::{
    BrokerClient, BrokerError, InMemoryBroker, SubscribeOptions, Subscription,
};
use streambridge_core::{
    IdleSweeper, ManagerConfig, ProxyError, Record, SessionManager, SessionOptions,
};
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

const SETTLE: Duration = Duration::from_millis(100);
const BACKOFF: Duration = Duration::from_millis(100);
const IDLE: Duration = Duration::from_secs(60);

async fn setup() -> (Arc<InMemoryBroker>, Arc<SessionManager>) {
    let broker = Arc::new(InMemoryBroker::new());
    broker.create_topic("t1", 1).await;
    let manager = manager_for(Arc::clone(&broker) as Arc<dyn BrokerClient>);
    (broker, manager)
}

/// Let spawned tasks (event pumps, detached commits) run to completion.
async fn drain_tasks() {
    sleep(Duration::from_millis(5)).await;
}

fn manager_for(broker: Arc<dyn BrokerClient>) -> Arc<SessionManager> {
    let config = ManagerConfig {
        settle_delay: SETTLE,
        recovery_backoff: BACKOFF,
        idle_timeout: IDLE,
        sweep_interval: Duration::from_secs(10),
        ..Default::default()
    };
    Arc::new(SessionManager::new(broker, config))
}

/// Delegates to the in-memory broker, but parks `subscribe` until a permit
/// is released. Lets tests interleave other operations mid-subscribe.
struct GatedBroker {
    inner: Arc<InMemoryBroker>,
    gate: Semaphore,
}

#[async_trait]
impl BrokerClient for GatedBroker {
    async fn subscribe(
        &self,
        group: &str,
        topic: &str,
        options: &SubscribeOptions,
    ) -> streambridge_broker::Result<Subscription> {
        // Consume the permit for good; each subscribe needs its own release.
        self.gate.acquire().await.unwrap().forget();
        self.inner.subscribe(group, topic, options).await
    }

    async fn topic_exists(&self, topic: &str) -> streambridge_broker::Result<bool> {
        self.inner.topic_exists(topic).await
    }

    async fn fetch_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> streambridge_broker::Result<i64> {
        self.inner.fetch_offset(group, topic, partition).await
    }
}

/// Delegates to the in-memory broker, but fails `subscribe` while the flag
/// is set.
struct FlakyBroker {
    inner: Arc<InMemoryBroker>,
    fail_subscribe: AtomicBool,
}

#[async_trait]
impl BrokerClient for FlakyBroker {
    async fn subscribe(
        &self,
        group: &str,
        topic: &str,
        options: &SubscribeOptions,
    ) -> streambridge_broker::Result<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::SubscribeFailed {
                group: group.to_string(),
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.subscribe(group, topic, options).await
    }

    async fn topic_exists(&self, topic: &str) -> streambridge_broker::Result<bool> {
        self.inner.topic_exists(topic).await
    }

    async fn fetch_offset(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> streambridge_broker::Result<i64> {
        self.inner.fetch_offset(group, topic, partition).await
    }
}

#[tokio::test(start_paused = true)]
async fn operations_on_unknown_session_return_not_found() {
    let (_broker, manager) = setup().await;

    assert!(matches!(
        manager.get_messages("g1", "nope", "t1").await,
        Err(ProxyError::SessionNotFound(_))
    ));
    assert!(matches!(
        manager.commit_offsets("g1", "nope").await,
        Err(ProxyError::SessionNotFound(_))
    ));
    assert!(matches!(
        manager.delete_session("g1", "nope").await,
        Err(ProxyError::SessionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn unknown_topic_is_rejected_and_not_recorded() {
    let (_broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();

    let err = manager
        .get_messages("g1", &session.instance_id, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::TopicNotFound(t) if t == "missing"));
    assert!(session.topics().await.is_empty());
    assert!(!session.has_binding().await);
}

#[tokio::test(start_paused = true)]
async fn first_access_creates_binding_and_waits_the_settling_delay() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();

    let before = Instant::now();
    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert!(records.is_empty());
    assert!(before.elapsed() >= SETTLE, "first access must settle");

    assert!(session.has_binding().await);
    assert_eq!(session.topics().await, vec!["t1".to_string()]);
    assert_eq!(broker.subscriber_count("t1").await, 1);

    // Known topic: no settling delay on subsequent polls.
    let before = Instant::now();
    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn poll_drains_everything_in_order_then_returns_empty() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    broker
        .publish("t1", 0, Some(Bytes::from("123")), Bytes::from("456"))
        .await
        .unwrap();
    broker
        .publish("t1", 0, Some(Bytes::from("789")), Bytes::from("abc"))
        .await
        .unwrap();
    drain_tasks().await;

    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(
        records,
        vec![
            Record {
                topic: "t1".to_string(),
                partition: 0,
                offset: 0,
                key: Some("123".to_string()),
                value: "456".to_string(),
            },
            Record {
                topic: "t1".to_string(),
                partition: 0,
                offset: 1,
                key: Some("789".to_string()),
                value: "abc".to_string(),
            },
        ]
    );

    // Exhaustive drain: nothing left behind, nothing duplicated.
    assert_eq!(session.buffered().await, 0);
    let again = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert!(again.is_empty());
    let again = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_commit_runs_detached_after_a_non_empty_poll() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    assert_eq!(manager.lookup_offset("g1", "t1", 0).await, Some(-1));

    broker.publish("t1", 0, None, Bytes::from("a")).await.unwrap();
    broker.publish("t1", 0, None, Bytes::from("b")).await.unwrap();
    drain_tasks().await;

    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    drain_tasks().await;
    assert_eq!(manager.lookup_offset("g1", "t1", 0).await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn auto_commit_disabled_leaves_offsets_to_explicit_commit() {
    let (broker, manager) = setup().await;
    let options = SessionOptions {
        auto_commit_enable: false,
        ..Default::default()
    };
    let session = manager.create_session("g1", options).await.unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    broker.publish("t1", 0, None, Bytes::from("a")).await.unwrap();
    drain_tasks().await;
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    drain_tasks().await;

    assert_eq!(manager.lookup_offset("g1", "t1", 0).await, Some(-1));

    manager
        .commit_offsets("g1", &session.instance_id)
        .await
        .unwrap();
    assert_eq!(manager.lookup_offset("g1", "t1", 0).await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn commit_without_binding_is_not_found() {
    let (_broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();

    let err = manager
        .commit_offsets("g1", &session.instance_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::NoActiveBinding(_)));
}

#[tokio::test(start_paused = true)]
async fn binding_error_triggers_close_backoff_and_recreate() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(broker.subscriber_count("t1").await, 1);

    broker.inject_error("t1", "simulated broker failure").await;
    sleep(BACKOFF + Duration::from_millis(50)).await;

    // Exactly one live binding again: the replacement.
    assert_eq!(broker.subscriber_count("t1").await, 1);
    assert!(session.has_binding().await);

    // The subscription survived: records published after recovery flow.
    broker
        .publish("t1", 0, None, Bytes::from("post-recovery"))
        .await
        .unwrap();
    drain_tasks().await;
    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "post-recovery");
}

#[tokio::test(start_paused = true)]
async fn repeated_errors_do_not_stack_recoveries() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    broker.inject_error("t1", "first").await;
    broker.inject_error("t1", "second").await;
    sleep(2 * BACKOFF + Duration::from_millis(100)).await;

    assert_eq!(broker.subscriber_count("t1").await, 1);
    assert!(session.has_binding().await);
}

#[tokio::test(start_paused = true)]
async fn deletion_during_recovery_backoff_does_not_leak_a_binding() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    broker.inject_error("t1", "boom").await;
    drain_tasks().await; // error consumed, recovery now in its backoff

    manager
        .delete_session("g1", &session.instance_id)
        .await
        .unwrap();

    sleep(BACKOFF + Duration::from_millis(50)).await;
    assert_eq!(broker.subscriber_count("t1").await, 0);
    assert!(manager.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn deletion_during_settling_delay_returns_not_found() {
    let (_broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    let instance_id = session.instance_id.clone();

    let task_manager = Arc::clone(&manager);
    let handle =
        tokio::spawn(async move { task_manager.get_messages("g1", &instance_id, "t1").await });

    // Let the request reach its settling delay, then delete the session.
    sleep(Duration::from_millis(10)).await;
    manager
        .delete_session("g1", &session.instance_id)
        .await
        .unwrap();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ProxyError::SessionNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn deletion_during_binding_creation_does_not_install_a_binding() {
    let inner = Arc::new(InMemoryBroker::new());
    inner.create_topic("t1", 1).await;
    let broker = Arc::new(GatedBroker {
        inner: Arc::clone(&inner),
        gate: Semaphore::new(0),
    });
    let manager = manager_for(Arc::clone(&broker) as Arc<dyn BrokerClient>);

    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    let instance_id = session.instance_id.clone();

    let task_manager = Arc::clone(&manager);
    let handle =
        tokio::spawn(async move { task_manager.get_messages("g1", &instance_id, "t1").await });
    drain_tasks().await; // request is now parked inside subscribe

    manager
        .delete_session("g1", &session.instance_id)
        .await
        .unwrap();
    broker.gate.add_permits(1);

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ProxyError::SessionNotFound(_))));
    // The late subscription was closed, not installed on the dead session.
    assert!(!session.has_binding().await);
    assert_eq!(inner.subscriber_count("t1").await, 0);
}

#[tokio::test(start_paused = true)]
async fn deletion_during_resubscribe_closes_the_replacement_binding() {
    let inner = Arc::new(InMemoryBroker::new());
    inner.create_topic("t1", 1).await;
    let broker = Arc::new(GatedBroker {
        inner: Arc::clone(&inner),
        gate: Semaphore::new(1),
    });
    let manager = manager_for(Arc::clone(&broker) as Arc<dyn BrokerClient>);

    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    inner.inject_error("t1", "boom").await;
    // Recovery closes the old binding, waits out the backoff, then parks in
    // its resubscribe (the gate is empty again).
    sleep(BACKOFF + Duration::from_millis(10)).await;

    manager
        .delete_session("g1", &session.instance_id)
        .await
        .unwrap();
    broker.gate.add_permits(1);
    drain_tasks().await;

    assert_eq!(inner.subscriber_count("t1").await, 0);
    assert!(!session.has_binding().await);
    assert!(manager.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn failed_resubscribe_lets_the_next_access_recreate_the_binding() {
    let inner = Arc::new(InMemoryBroker::new());
    inner.create_topic("t1", 1).await;
    let broker = Arc::new(FlakyBroker {
        inner: Arc::clone(&inner),
        fail_subscribe: AtomicBool::new(false),
    });
    let manager = manager_for(Arc::clone(&broker) as Arc<dyn BrokerClient>);

    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    broker.fail_subscribe.store(true, Ordering::SeqCst);
    inner.inject_error("t1", "boom").await;
    sleep(BACKOFF + Duration::from_millis(50)).await;

    // Resubscribe failed: bindingless, and the topic is forgotten so it does
    // not drain an empty buffer forever.
    assert!(!session.has_binding().await);
    assert!(session.topics().await.is_empty());

    broker.fail_subscribe.store(false, Ordering::SeqCst);
    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert!(records.is_empty());
    assert!(session.has_binding().await);
    assert_eq!(inner.subscriber_count("t1").await, 1);

    inner
        .publish("t1", 0, None, Bytes::from("after-retry"))
        .await
        .unwrap();
    drain_tasks().await;
    let records = manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, "after-retry");
}

#[tokio::test(start_paused = true)]
async fn delete_closes_the_binding_and_forgets_the_session() {
    let (broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();
    assert_eq!(broker.subscriber_count("t1").await, 1);

    manager
        .delete_session("g1", &session.instance_id)
        .await
        .unwrap();

    assert_eq!(broker.subscriber_count("t1").await, 0);
    assert!(matches!(
        manager.get_messages("g1", &session.instance_id, "t1").await,
        Err(ProxyError::SessionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn sweep_evicts_only_idle_sessions_with_bindings() {
    let (broker, manager) = setup().await;

    // A: bound, will go idle. B: never bound, just as old.
    let session_a = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session_a.instance_id, "t1")
        .await
        .unwrap();
    let session_b = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();

    sleep(IDLE + Duration::from_secs(1)).await;

    // C: bound, freshly polled.
    let session_c = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session_c.instance_id, "t1")
        .await
        .unwrap();

    let sweeper = IdleSweeper::new(Arc::clone(&manager));
    let evicted = sweeper.sweep_once().await;
    assert_eq!(evicted, 1);

    assert!(manager.registry().lookup("g1", &session_a.instance_id).await.is_none());
    assert!(manager.registry().lookup("g1", &session_b.instance_id).await.is_some());
    assert!(manager.registry().lookup("g1", &session_c.instance_id).await.is_some());
    assert_eq!(broker.subscriber_count("t1").await, 1);

    assert!(matches!(
        manager.get_messages("g1", &session_a.instance_id, "t1").await,
        Err(ProxyError::SessionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn sweeper_task_evicts_on_its_own_clock() {
    let (_broker, manager) = setup().await;
    let session = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    manager
        .get_messages("g1", &session.instance_id, "t1")
        .await
        .unwrap();

    let sweeper = Arc::new(IdleSweeper::new(Arc::clone(&manager)));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = sweeper.start(shutdown_rx);

    sleep(IDLE + Duration::from_secs(15)).await;
    assert!(manager.registry().is_empty().await);

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lookup_offset_failures_collapse_to_none() {
    let (_broker, manager) = setup().await;
    assert_eq!(manager.lookup_offset("g1", "t1", 0).await, Some(-1));
    assert_eq!(manager.lookup_offset("g1", "missing", 0).await, None);
}

#[tokio::test(start_paused = true)]
async fn sessions_in_the_same_group_get_distinct_ids() {
    let (_broker, manager) = setup().await;
    let a = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    let b = manager
        .create_session("g1", SessionOptions::default())
        .await
        .unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(manager.registry().len().await, 2);
}
