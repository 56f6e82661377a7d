//! Error types for broker client operations.
//!
//! Every fallible call on [`crate::BrokerClient`] or
//! [`crate::ConsumerBinding`] returns one of these variants. The proxy core
//! translates them into its own caller-facing taxonomy; nothing here is
//! exposed over HTTP directly.

use thiserror::Error;

/// Convenience alias used throughout the broker boundary.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors produced by broker client implementations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The topic does not exist on the broker.
    #[error("topic '{0}' does not exist")]
    TopicNotFound(String),

    /// Creating a subscription failed.
    #[error("failed to subscribe to '{topic}' for group '{group}': {reason}")]
    SubscribeFailed {
        group: String,
        topic: String,
        reason: String,
    },

    /// An offset commit was rejected or lost.
    #[error("offset commit failed: {0}")]
    CommitFailed(String),

    /// Closing a binding did not complete cleanly.
    #[error("failed to close binding: {0}")]
    CloseFailed(String),

    /// A diagnostic committed-offset read failed.
    #[error("offset fetch failed for {group}/{topic}/{partition}: {reason}")]
    OffsetFetchFailed {
        group: String,
        topic: String,
        partition: u32,
        reason: String,
    },

    /// Broker connectivity problem (connection refused, timeout, ...).
    #[error("broker transport error: {0}")]
    Transport(String),
}
