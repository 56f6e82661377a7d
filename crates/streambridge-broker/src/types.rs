//! Record, event, and option types shared across the broker boundary.

use bytes::Bytes;
use std::time::Duration;

/// A record as delivered by a broker subscription, before any text decoding.
///
/// Keys and values stay as raw bytes here; the proxy core decodes them when
/// records are handed to an HTTP caller.
#[derive(Debug, Clone)]
pub struct DeliveredRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

/// Asynchronous events emitted by a live consumer binding.
#[derive(Debug)]
pub enum BindingEvent {
    /// A record arrived on one of the subscribed partitions.
    Message(DeliveredRecord),
    /// The binding hit a broker-side error. The binding may be unusable
    /// afterwards; the proxy core reacts by closing and recreating it.
    Error(String),
    /// The consumer asked for an offset outside the partition's range.
    /// Advisory only; offset reset is the broker's job at subscribe time.
    OffsetOutOfRange { topic: String, partition: u32 },
}

/// Value encoding requested for delivered records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Buffer,
}

/// Options passed to [`crate::BrokerClient::subscribe`].
///
/// The defaults mirror the fetch tuning the proxy has always used: block at
/// most 100ms waiting for data, respond as soon as a single byte is
/// available, and cap a fetch at 4 MiB per partition.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Broker-side auto commit. Always disabled by the proxy; commits are
    /// driven explicitly so the session owns the commit clock.
    pub auto_commit: bool,
    /// Maximum time the broker may block a fetch waiting for data.
    pub fetch_max_wait: Duration,
    /// Minimum bytes that must be available before a fetch responds.
    pub fetch_min_bytes: u32,
    /// Upper bound on the message set returned for one partition.
    pub fetch_max_bytes: u32,
    /// Whether to start fetching from an explicit offset in the payload.
    pub from_offset: bool,
    /// Requested value encoding.
    pub encoding: Encoding,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            auto_commit: false,
            fetch_max_wait: Duration::from_millis(100),
            fetch_min_bytes: 1,
            fetch_max_bytes: 4 * 1024 * 1024,
            from_offset: false,
            encoding: Encoding::Utf8,
        }
    }
}
