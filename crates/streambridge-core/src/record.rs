//! The client-visible record shape returned by a poll.

use streambridge_broker::DeliveredRecord;

/// A buffered record after text decoding, as handed to the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: String,
}

impl From<DeliveredRecord> for Record {
    fn from(record: DeliveredRecord) -> Self {
        Self {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            key: record
                .key
                .as_ref()
                .map(|k| String::from_utf8_lossy(k).to_string()),
            value: String::from_utf8_lossy(&record.value).to_string(),
        }
    }
}
