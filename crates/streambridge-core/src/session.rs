//! The session data model.
//!
//! A `Session` is one client-visible consumer handle: a group/instance pair
//! plus the state the proxy tracks on its behalf. All mutable state lives
//! behind a per-session async mutex so binding recreation, deletion, buffer
//! appends, and drains serialize against each other.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use streambridge_broker::{ConsumerBinding, DeliveredRecord};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Where a fresh subscription starts when the group has no committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Start from the earliest available offset.
    Smallest,
    /// Start from the latest offset.
    Largest,
}

/// Options supplied at session creation, with the proxy's defaults applied.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub auto_offset_reset: OffsetReset,
    pub auto_commit_enable: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_offset_reset: OffsetReset::Largest,
            auto_commit_enable: true,
        }
    }
}

/// Mutable session state, guarded by [`Session::state`].
pub(crate) struct SessionState {
    /// Topics this session has subscribed to. Checked before re-subscribing;
    /// a topic already present drains the buffer with no settling delay.
    pub topics: HashSet<String>,
    /// The live binding, if any. At most one at a time; recreation installs
    /// a replacement only after the prior binding's close acknowledges.
    pub binding: Option<Arc<dyn ConsumerBinding>>,
    /// Buffered records awaiting a poll, in delivery order. Unbounded: a
    /// slow poller trades memory for completeness (documented limitation).
    pub messages: Vec<DeliveredRecord>,
    /// Eviction clock; refreshed on every poll and at creation.
    pub last_poll: Instant,
    /// Set while the error-recovery machine owns the binding slot. While
    /// set, no other task may install or tear down a binding.
    pub recovering: bool,
    /// Incremented on every binding install (and on deletion). Event pumps
    /// carry the epoch they were spawned under and drop events once stale;
    /// a subscribe completing against a moved epoch closes its binding
    /// instead of installing it.
    pub epoch: u64,
}

/// One client-visible consumer session.
pub struct Session {
    pub group: String,
    pub instance_id: String,
    /// Derived registry key: `group + "/" + instance_id`.
    pub id: String,
    pub options: SessionOptions,
    /// Creation time, diagnostic only.
    pub created: SystemTime,
    pub(crate) state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("group", &self.group)
            .field("instance_id", &self.instance_id)
            .field("id", &self.id)
            .field("options", &self.options)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(group: &str, instance_id: &str, options: SessionOptions) -> Self {
        Self {
            group: group.to_string(),
            instance_id: instance_id.to_string(),
            id: derive_id(group, instance_id),
            options,
            created: SystemTime::now(),
            state: Mutex::new(SessionState {
                topics: HashSet::new(),
                binding: None,
                messages: Vec::new(),
                last_poll: Instant::now(),
                recovering: false,
                epoch: 0,
            }),
        }
    }

    /// Number of records currently buffered.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Whether a live binding is installed.
    pub async fn has_binding(&self) -> bool {
        self.state.lock().await.binding.is_some()
    }

    /// Topics this session has accessed so far.
    pub async fn topics(&self) -> Vec<String> {
        self.state.lock().await.topics.iter().cloned().collect()
    }
}

/// Build the registry key for a group/instance pair.
pub(crate) fn derive_id(group: &str, instance_id: &str) -> String {
    format!("{group}/{instance_id}")
}
