//! Retry bookkeeping and dead-letter records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Retry state carried on a message between deliveries.
///
/// The count lives only in message headers; workers keep no retry state of
/// their own, so a redelivery may land on any process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryMetadata {
    pub retry_count: u32,
}

impl RetryMetadata {
    pub fn new(retry_count: u32) -> Self {
        Self { retry_count }
    }

    /// Metadata of a message that has never been redelivered.
    pub fn first_attempt() -> Self {
        Self::default()
    }

    pub fn is_first_attempt(&self) -> bool {
        self.retry_count == 0
    }

    /// Metadata for the next requeued copy.
    pub fn next(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
        }
    }
}

/// Envelope describing a job that was permanently abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub original_queue: String,
    pub reason: String,
    pub retry_count: u32,
    /// Inbound body, byte for byte
    pub original_body: Vec<u8>,
}

impl FailureRecord {
    pub fn new(
        original_queue: impl Into<String>,
        reason: impl Into<String>,
        retry: RetryMetadata,
        original_body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            original_queue: original_queue.into(),
            reason: reason.into(),
            retry_count: retry.retry_count,
            original_body: original_body.into(),
        }
    }
}
