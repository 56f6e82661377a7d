//! Consumer session lifecycle management for StreamBridge.
//!
//! This crate owns the proxy's concurrency-sensitive state: the session
//! registry, lazy creation and error-driven recreation of broker consumer
//! bindings, per-session message buffering, offset commits, and idle
//! eviction.
//!
//! ## Components
//!
//! - [`SessionRegistry`]: maps `group/instance_id` to [`Session`] records.
//! - [`SessionManager`]: orchestrates binding creation, the recovery state
//!   machine, polling, and commits. Owns its registry; there is no global
//!   state, so tests can run many isolated managers side by side.
//! - [`IdleSweeper`]: recurring task evicting sessions that have not been
//!   polled within the configured idle window.
//!
//! ## Concurrency model
//!
//! Each session's mutable state (topic set, binding, buffer, poll clock,
//! recovery flag) sits behind its own async mutex, so message appends,
//! drains, recreation, and deletion cannot interleave destructively even
//! under a multi-threaded runtime. Every installed binding carries an epoch;
//! event pumps for superseded bindings observe a stale epoch and drop their
//! events instead of touching the buffer.

pub mod config;
pub mod error;
pub mod manager;
pub mod record;
pub mod registry;
pub mod session;
pub mod sweeper;

pub use config::ManagerConfig;
pub use error::{ProxyError, Result};
pub use manager::SessionManager;
pub use record::Record;
pub use registry::SessionRegistry;
pub use session::{OffsetReset, Session, SessionOptions};
pub use sweeper::IdleSweeper;
