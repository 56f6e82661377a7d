//! Caller-facing error taxonomy for proxy operations.
//!
//! Binding-level asynchronous failures never appear here: the error event on
//! a live binding is handled by the recovery state machine and only logged.
//! These variants are what the HTTP boundary translates into status codes.

use streambridge_broker::BrokerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// A session with the derived id already exists.
    #[error("consumer '{0}' already exists")]
    Conflict(String),

    /// No session is registered under the given group/instance pair.
    #[error("consumer '{0}' not found")]
    SessionNotFound(String),

    /// The session exists but has no live binding to operate on.
    #[error("consumer '{0}' has no active binding")]
    NoActiveBinding(String),

    /// The topic-existence check came back negative or failed.
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    /// Creating a broker consumer binding failed.
    #[error("failed to create consumer binding")]
    BindingCreation(#[source] BrokerError),

    /// An explicitly requested offset commit failed at the broker.
    #[error("offset commit failed")]
    CommitFailed(#[source] BrokerError),

    /// Broker connectivity problem outside the binding event path. Not
    /// produced with the in-memory broker; reserved for wire-protocol
    /// client implementations plugged in behind [`BrokerClient`]. The HTTP
    /// boundary maps it to 502.
    ///
    /// [`BrokerClient`]: streambridge_broker::BrokerClient
    #[error("broker transport error")]
    Transport(#[source] BrokerError),
}
