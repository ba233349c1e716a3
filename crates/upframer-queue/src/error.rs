//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    #[error("Settlement failed: {0}")]
    SettleFailed(String),

    #[error("No binding for routing key {routing_key} on exchange {exchange}")]
    Unroutable { exchange: String, routing_key: String },

    #[error("Broker connection is closed")]
    Closed,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn consume_failed(msg: impl Into<String>) -> Self {
        Self::ConsumeFailed(msg.into())
    }

    pub fn settle_failed(msg: impl Into<String>) -> Self {
        Self::SettleFailed(msg.into())
    }
}
