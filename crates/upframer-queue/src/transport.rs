//! The broker transport capability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::headers::MessageHeaders;
use crate::topology::DeadLetterTopology;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
    pub content_type: String,
    /// Survives a broker restart
    pub persistent: bool,
}

impl OutboundMessage {
    /// A persistent JSON message.
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: MessageHeaders::new(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            persistent: true,
        }
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = headers;
        self
    }
}

/// A message handed to the worker. Must be settled exactly once with
/// [`BrokerTransport::ack`] or [`BrokerTransport::nack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was consumed from
    pub queue: String,
    /// Broker-assigned identifier used to settle the delivery
    pub tag: String,
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
    /// The broker has handed this message out before
    pub redelivered: bool,
}

/// Durable queue with at-least-once delivery and manual settlement.
///
/// One handle is created by the composition root and shared by the
/// components that publish or consume.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Declare a durable queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> QueueResult<()>;

    /// Declare a dead-letter exchange, its queue, and the binding between
    /// them. Idempotent.
    async fn declare_dead_letter(&self, topology: &DeadLetterTopology) -> QueueResult<()>;

    /// Publish directly to a queue.
    async fn publish(&self, queue: &str, message: OutboundMessage) -> QueueResult<()>;

    /// Publish through an exchange. Unroutable messages are an error.
    async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> QueueResult<()>;

    /// Wait up to `block` for the next delivery from `queue`. At most one
    /// delivery is outstanding per consumer.
    async fn next_delivery(&self, queue: &str, block: Duration) -> QueueResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Reject a delivery. With `requeue` false the message is dropped.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()>;

    async fn close(&self) -> QueueResult<()>;
}
