//! API models for REST endpoints.
//!
//! Request fields keep the property names the proxy has always accepted
//! (`auto.offset.reset`, `auto.commit.enable`); responses are snake_case.

use serde::{Deserialize, Serialize};
use streambridge_core::{OffsetReset, Record, SessionOptions};
use utoipa::ToSchema;

/// Offset reset policy as spelled on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AutoOffsetReset {
    Smallest,
    Largest,
}

impl From<AutoOffsetReset> for OffsetReset {
    fn from(reset: AutoOffsetReset) -> Self {
        match reset {
            AutoOffsetReset::Smallest => OffsetReset::Smallest,
            AutoOffsetReset::Largest => OffsetReset::Largest,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateConsumerRequest {
    #[serde(rename = "auto.offset.reset")]
    pub auto_offset_reset: Option<AutoOffsetReset>,
    #[serde(rename = "auto.commit.enable")]
    pub auto_commit_enable: Option<bool>,
}

impl CreateConsumerRequest {
    /// Apply the proxy defaults for unspecified options.
    pub fn into_options(self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            auto_offset_reset: self
                .auto_offset_reset
                .map(Into::into)
                .unwrap_or(defaults.auto_offset_reset),
            auto_commit_enable: self
                .auto_commit_enable
                .unwrap_or(defaults.auto_commit_enable),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateConsumerResponse {
    pub instance_id: String,
    pub base_uri: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: String,
}

impl From<Record> for ConsumedRecord {
    fn from(record: Record) -> Self {
        Self {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            key: record.key,
            value: record.value,
        }
    }
}

/// Diagnostic committed-offset read.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OffsetInfo {
    pub group: String,
    pub topic: String,
    pub partition: u32,
    /// Committed offset, or `null` when the lookup failed or nothing has
    /// been committed (-1 also means no commit, mirroring the broker).
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}
