//! Per-message header metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use upframer_models::{FailureRecord, RetryMetadata};

/// Number of times a job has been requeued after a temporary failure.
pub const HEADER_RETRY_COUNT: &str = "x-retry-count";
/// Queue a dead-lettered message was consumed from.
pub const HEADER_ORIGINAL_QUEUE: &str = "x-original-queue";
/// Human-readable reason a message was dead-lettered.
pub const HEADER_FAILURE_REASON: &str = "x-failure-reason";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Int(i64),
    Str(String),
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<u32> for HeaderValue {
    fn from(v: u32) -> Self {
        HeaderValue::Int(i64::from(v))
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Str(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Str(v.to_string())
    }
}

/// Header table attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(BTreeMap<String, HeaderValue>);

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(HeaderValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.0.iter()
    }

    /// Read the retry counter. Absent or unreadable values count as a first
    /// delivery.
    pub fn retry_metadata(&self) -> RetryMetadata {
        let count = match self.0.get(HEADER_RETRY_COUNT) {
            None => return RetryMetadata::first_attempt(),
            Some(HeaderValue::Int(n)) => u32::try_from(*n).ok(),
            Some(HeaderValue::Str(s)) => s.trim().parse::<u32>().ok(),
        };

        match count {
            Some(n) => RetryMetadata::new(n),
            None => {
                warn!(
                    "Ignoring unreadable {} header: {:?}",
                    HEADER_RETRY_COUNT,
                    self.0.get(HEADER_RETRY_COUNT)
                );
                RetryMetadata::first_attempt()
            }
        }
    }

    /// Headers of a requeued copy carrying `retry`.
    pub fn for_retry(retry: RetryMetadata) -> Self {
        Self::new().with(HEADER_RETRY_COUNT, retry.retry_count)
    }

    /// Headers of a dead-lettered message.
    pub fn for_failure(record: &FailureRecord) -> Self {
        Self::new()
            .with(HEADER_ORIGINAL_QUEUE, record.original_queue.as_str())
            .with(HEADER_FAILURE_REASON, record.reason.as_str())
            .with(HEADER_RETRY_COUNT, record.retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_header_is_first_attempt() {
        assert!(MessageHeaders::new().retry_metadata().is_first_attempt());
    }

    #[test]
    fn test_retry_count_from_int_and_string() {
        let int = MessageHeaders::new().with(HEADER_RETRY_COUNT, 2u32);
        let text = MessageHeaders::new().with(HEADER_RETRY_COUNT, "3");

        assert_eq!(int.retry_metadata().retry_count, 2);
        assert_eq!(text.retry_metadata().retry_count, 3);
    }

    #[test]
    fn test_negative_or_garbage_count_is_first_attempt() {
        let negative = MessageHeaders::new().with(HEADER_RETRY_COUNT, -1i64);
        let garbage = MessageHeaders::new().with(HEADER_RETRY_COUNT, "many");

        assert_eq!(negative.retry_metadata().retry_count, 0);
        assert_eq!(garbage.retry_metadata().retry_count, 0);
    }

    #[test]
    fn test_failure_headers() {
        let record = FailureRecord::new(
            "job-creation",
            "invalid job data",
            RetryMetadata::new(1),
            b"x".to_vec(),
        );
        let headers = MessageHeaders::for_failure(&record);

        assert_eq!(headers.get_str(HEADER_ORIGINAL_QUEUE), Some("job-creation"));
        assert_eq!(headers.get_str(HEADER_FAILURE_REASON), Some("invalid job data"));
        assert_eq!(headers.get(HEADER_RETRY_COUNT), Some(&HeaderValue::Int(1)));
    }

    #[test]
    fn test_headers_json_shape() {
        let headers = MessageHeaders::for_retry(RetryMetadata::new(1));
        let json = serde_json::to_string(&headers).unwrap();

        assert_eq!(json, r#"{"x-retry-count":1}"#);
        let back: MessageHeaders = serde_json::from_str(&json).unwrap();
        assert_eq!(back, headers);
    }
}
