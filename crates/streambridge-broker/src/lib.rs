//! Broker client boundary for StreamBridge.
//!
//! The proxy never speaks a broker wire protocol directly. Everything it
//! needs from the broker side is expressed through two traits:
//!
//! - [`BrokerClient`]: opens subscriptions, answers topic-existence checks,
//!   and serves best-effort committed-offset reads.
//! - [`ConsumerBinding`]: one live subscription. Records and errors arrive
//!   asynchronously as [`BindingEvent`]s on a channel; `close` and `commit`
//!   are explicit calls against the binding.
//!
//! Concrete wire-protocol clients plug in behind these traits. The crate
//! ships [`InMemoryBroker`], an in-process implementation used by tests and
//! the local development server.

pub mod client;
pub mod error;
pub mod mem;
pub mod types;

pub use client::{BrokerClient, ConsumerBinding, Subscription};
pub use error::{BrokerError, Result};
pub use mem::InMemoryBroker;
pub use types::{BindingEvent, DeliveredRecord, Encoding, SubscribeOptions};
