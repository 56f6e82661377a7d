//! The session lifecycle manager.
//!
//! Orchestrates everything between the HTTP boundary and the broker client:
//! lazy binding creation on first topic access, the error-recovery state
//! machine (close, fixed backoff, recreate), drain-all polling with detached
//! auto-commit, explicit commits, and registry-first deletion.
//!
//! ## Binding lifecycle
//!
//! ```text
//! NoBinding --ensure_binding--> Active --error event--> Recovering
//!      ^                           ^                         |
//!      |                           +----- backoff + resub ---+
//!      +------- delete_session (terminal, close acked) ------+
//! ```
//!
//! A second error while `Recovering` is logged and dropped; there is no
//! retry queue. A failed resubscribe leaves the session bindingless, to be
//! recreated by a later first access.

use std::sync::Arc;

use streambridge_broker::{BindingEvent, BrokerClient, Subscription};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::ManagerConfig;
use crate::error::{ProxyError, Result};
use crate::record::Record;
use crate::registry::SessionRegistry;
use crate::session::{derive_id, Session, SessionOptions};

pub struct SessionManager {
    registry: SessionRegistry,
    client: Arc<dyn BrokerClient>,
    config: ManagerConfig,
}

impl SessionManager {
    pub fn new(client: Arc<dyn BrokerClient>, config: ManagerConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            client,
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a new session for `group` with defaults applied.
    pub async fn create_session(
        &self,
        group: &str,
        options: SessionOptions,
    ) -> Result<Arc<Session>> {
        let session = self.registry.register(group, None, options).await?;
        info!(consumer = %session.id, "consumer session created");
        Ok(session)
    }

    /// Fetch buffered records for `topic` on behalf of a session.
    ///
    /// On first access to a topic this verifies the topic exists, lazily
    /// creates the binding if none is installed, records the topic, and
    /// waits the settling delay before draining (the buffer is usually still
    /// empty at that point). Known topics drain immediately.
    pub async fn get_messages(
        self: &Arc<Self>,
        group: &str,
        instance_id: &str,
        topic: &str,
    ) -> Result<Vec<Record>> {
        let id = derive_id(group, instance_id);
        let session = self
            .registry
            .get(&id)
            .await
            .ok_or_else(|| ProxyError::SessionNotFound(id.clone()))?;

        let known_topic = {
            let state = session.state.lock().await;
            state.topics.contains(topic)
        };
        if known_topic {
            return Ok(self.poll(&session).await);
        }

        match self.client.topic_exists(topic).await {
            Ok(true) => {}
            Ok(false) => return Err(ProxyError::TopicNotFound(topic.to_string())),
            Err(e) => {
                warn!(topic, error = %e, "topic existence check failed");
                return Err(ProxyError::TopicNotFound(topic.to_string()));
            }
        }

        self.ensure_binding(&session, topic).await?;
        {
            let mut state = session.state.lock().await;
            state.topics.insert(topic.to_string());
        }

        // Give the fresh subscription time to start receiving before the
        // first drain.
        sleep(self.config.settle_delay).await;

        // The session may have been deleted while we slept; do not resurrect
        // it through a stale handle.
        let session = self
            .registry
            .get(&id)
            .await
            .ok_or(ProxyError::SessionNotFound(id))?;
        Ok(self.poll(&session).await)
    }

    /// Commit all consumed offsets for the session's binding.
    pub async fn commit_offsets(&self, group: &str, instance_id: &str) -> Result<()> {
        let id = derive_id(group, instance_id);
        let session = self
            .registry
            .get(&id)
            .await
            .ok_or_else(|| ProxyError::SessionNotFound(id.clone()))?;

        let binding = {
            let state = session.state.lock().await;
            state.binding.clone()
        }
        .ok_or(ProxyError::NoActiveBinding(id))?;

        binding
            .commit(true)
            .await
            .map_err(ProxyError::CommitFailed)?;
        debug!(consumer = %session.id, "offsets committed");
        Ok(())
    }

    /// Remove the session from the registry, then close its binding. The
    /// registry removal comes first so no new poll or commit can observe the
    /// session; the call returns only after the close acknowledges.
    pub async fn delete_session(&self, group: &str, instance_id: &str) -> Result<()> {
        let id = derive_id(group, instance_id);
        let session = self
            .registry
            .remove(&id)
            .await
            .ok_or(ProxyError::SessionNotFound(id))?;

        let binding = {
            let mut state = session.state.lock().await;
            // Invalidate any still-running event pump and fence in-flight
            // binding installs for this session.
            state.epoch += 1;
            state.binding.take()
        };
        if let Some(binding) = binding {
            if let Err(e) = binding.close(false).await {
                warn!(consumer = %session.id, error = %e, "binding close failed during delete");
            }
        }
        info!(consumer = %session.id, "consumer session deleted");
        Ok(())
    }

    /// Best-effort committed-offset read for diagnostics. Failures are
    /// logged and collapse to `None`; this is never on the commit path.
    pub async fn lookup_offset(&self, group: &str, topic: &str, partition: u32) -> Option<i64> {
        match self.client.fetch_offset(group, topic, partition).await {
            Ok(offset) => Some(offset),
            Err(e) => {
                warn!(group, topic, partition, error = %e, "offset lookup failed");
                None
            }
        }
    }

    /// Atomically drain the session's buffer and refresh its poll clock.
    ///
    /// When auto-commit is enabled and the drain returned records, a commit
    /// of all consumed offsets is issued on a detached task; its failure is
    /// logged, never surfaced to the caller.
    async fn poll(&self, session: &Arc<Session>) -> Vec<Record> {
        let (drained, binding) = {
            let mut state = session.state.lock().await;
            state.last_poll = Instant::now();
            let drained = std::mem::take(&mut state.messages);
            (drained, state.binding.clone())
        };

        if drained.is_empty() {
            return Vec::new();
        }

        if session.options.auto_commit_enable {
            if let Some(binding) = binding {
                let consumer = session.id.clone();
                trace!(consumer = %consumer, "auto-commit after poll");
                tokio::spawn(async move {
                    if let Err(e) = binding.commit(true).await {
                        warn!(consumer = %consumer, error = %e, "auto-commit failed");
                    }
                });
            }
        }

        trace!(consumer = %session.id, count = drained.len(), "returning drained records");
        drained.into_iter().map(Record::from).collect()
    }

    /// Install a binding for `topic` if the session has none.
    ///
    /// A session that already holds a binding is left untouched: adding
    /// topics to a live binding is unsupported, so the request is a no-op.
    /// While recovery owns the binding slot, creation is likewise skipped;
    /// the recovery machine will reinstall the subscription itself.
    ///
    /// The subscribe runs without the session lock held. The new binding is
    /// installed only if the session's epoch has not moved in the meantime;
    /// a moved epoch means a concurrent install or deletion won, and the
    /// extra subscription is closed instead.
    async fn ensure_binding(self: &Arc<Self>, session: &Arc<Session>, topic: &str) -> Result<()> {
        let dispatch_epoch = {
            let state = session.state.lock().await;
            if state.binding.is_some() {
                debug!(
                    consumer = %session.id,
                    topic,
                    "binding already active; adding topics to a live binding is unsupported"
                );
                return Ok(());
            }
            if state.recovering {
                debug!(consumer = %session.id, topic, "recovery in progress, skipping binding creation");
                return Ok(());
            }
            state.epoch
        };

        debug!(consumer = %session.id, topic, "creating consumer binding");
        let subscription = self
            .client
            .subscribe(&session.group, topic, &self.config.subscribe_options)
            .await
            .map_err(ProxyError::BindingCreation)?;

        let Subscription { binding, events } = subscription;
        {
            let mut state = session.state.lock().await;
            if state.epoch != dispatch_epoch {
                // A concurrent install or a deletion moved the epoch while
                // the subscribe was in flight; nothing would ever close a
                // binding installed now.
                debug!(consumer = %session.id, topic, "binding superseded during creation, closing it");
                drop(state);
                if let Err(e) = binding.close(false).await {
                    warn!(consumer = %session.id, error = %e, "failed to close superseded binding");
                }
                return Ok(());
            }
            state.epoch += 1;
            let epoch = state.epoch;
            state.binding = Some(binding);
            self.spawn_pump(session, topic, epoch, events);
        }
        Ok(())
    }

    fn spawn_pump(
        self: &Arc<Self>,
        session: &Arc<Session>,
        topic: &str,
        epoch: u64,
        events: mpsc::Receiver<BindingEvent>,
    ) {
        let manager = Arc::clone(self);
        let session = Arc::clone(session);
        let topic = topic.to_string();
        tokio::spawn(async move {
            manager.pump_events(session, topic, epoch, events).await;
        });
    }

    /// Consume binding events until the channel closes (which happens after
    /// the binding's close acknowledges).
    async fn pump_events(
        self: Arc<Self>,
        session: Arc<Session>,
        topic: String,
        epoch: u64,
        mut events: mpsc::Receiver<BindingEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                BindingEvent::Message(record) => {
                    let mut state = session.state.lock().await;
                    // A stale epoch means a replacement binding owns this
                    // session now; its pump appends, we drop.
                    if state.epoch == epoch {
                        state.messages.push(record);
                    }
                }
                BindingEvent::Error(reason) => {
                    error!(
                        consumer = %session.id,
                        %reason,
                        "error in consumer binding, closing and recreating"
                    );
                    self.recover(&session, &topic, epoch).await;
                }
                BindingEvent::OffsetOutOfRange { topic, partition } => {
                    warn!(
                        consumer = %session.id,
                        topic = %topic,
                        partition,
                        "broker reported offset out of range"
                    );
                }
            }
        }
        trace!(consumer = %session.id, topic = %topic, "binding event stream ended");
    }

    /// The error-recovery state machine: close the failed binding without
    /// flushing commits, wait the fixed backoff, then resubscribe the same
    /// group/topic. Errors arriving while recovery is already in progress
    /// are dropped.
    async fn recover(self: &Arc<Self>, session: &Arc<Session>, topic: &str, epoch: u64) {
        let binding = {
            let mut state = session.state.lock().await;
            if state.epoch != epoch {
                debug!(consumer = %session.id, "stale binding error, ignoring");
                return;
            }
            if state.recovering {
                debug!(consumer = %session.id, "recovery already in progress, dropping error");
                return;
            }
            state.recovering = true;
            state.binding.take()
        };

        if let Some(binding) = binding {
            // Close without flushing outstanding commits.
            if let Err(e) = binding.close(false).await {
                warn!(consumer = %session.id, error = %e, "failed to close broken binding");
            }
        }

        sleep(self.config.recovery_backoff).await;

        // Deleted during the backoff: nothing left to recreate.
        if self.registry.get(&session.id).await.is_none() {
            debug!(consumer = %session.id, "session deleted during recovery backoff");
            return;
        }

        info!(consumer = %session.id, topic, "recreating consumer binding");
        match self
            .client
            .subscribe(&session.group, topic, &self.config.subscribe_options)
            .await
        {
            Ok(Subscription { binding, events }) => {
                let mut state = session.state.lock().await;
                if state.epoch != epoch {
                    // Deleted while the resubscribe was in flight; close the
                    // replacement instead of installing it on a dead slot.
                    debug!(consumer = %session.id, "session deleted during resubscribe");
                    state.recovering = false;
                    drop(state);
                    if let Err(e) = binding.close(false).await {
                        warn!(consumer = %session.id, error = %e, "failed to close replacement binding");
                    }
                    return;
                }
                state.epoch += 1;
                let epoch = state.epoch;
                state.binding = Some(binding);
                state.recovering = false;
                self.spawn_pump(session, topic, epoch, events);
            }
            Err(e) => {
                error!(consumer = %session.id, topic, error = %e, "failed to recreate binding");
                let mut state = session.state.lock().await;
                state.recovering = false;
                // Forget the topic so the next access goes through binding
                // creation again instead of draining an empty buffer.
                state.topics.remove(topic);
            }
        }
    }
}
