//! The `BrokerClient` / `ConsumerBinding` trait seam.
//!
//! Both traits are object-safe and held as `Arc<dyn ...>` so the proxy core,
//! the HTTP layer, and tests can share one client instance across tasks.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{BindingEvent, SubscribeOptions};

/// A live subscription: the binding handle plus its event stream.
///
/// The receiver carries every message, error, and out-of-range notification
/// for this binding. Once [`ConsumerBinding::close`] acknowledges, no
/// further events will be delivered; the channel closes shortly after.
pub struct Subscription {
    pub binding: std::sync::Arc<dyn ConsumerBinding>,
    pub events: mpsc::Receiver<BindingEvent>,
}

/// One broker subscription for one consumer group.
#[async_trait]
pub trait ConsumerBinding: Send + Sync {
    /// Commit consumed offsets. `commit_all` forces a commit even when the
    /// broker client believes nothing changed.
    async fn commit(&self, commit_all: bool) -> Result<()>;

    /// Close the subscription. `graceful` requests an offset flush before
    /// shutdown. The returned acknowledgement is the only fence guaranteeing
    /// that no further events fire for this binding instance.
    async fn close(&self, graceful: bool) -> Result<()>;
}

/// Entry point to the broker: subscriptions, topic metadata, offset reads.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open a subscription to `topic` under consumer group `group`.
    async fn subscribe(
        &self,
        group: &str,
        topic: &str,
        options: &SubscribeOptions,
    ) -> Result<Subscription>;

    /// Whether `topic` exists on the broker.
    async fn topic_exists(&self, topic: &str) -> Result<bool>;

    /// Read the committed offset for a group/topic/partition from the
    /// coordination service. Best effort, diagnostic only; never on the
    /// commit path.
    async fn fetch_offset(&self, group: &str, topic: &str, partition: u32) -> Result<i64>;
}
