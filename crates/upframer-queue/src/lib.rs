//! Broker transport capability.
//!
//! This crate provides:
//! - The `BrokerTransport` trait consumed by the worker core
//! - Message headers, including the retry counter contract
//! - Queue and dead-letter naming
//! - A Redis Streams transport and an in-memory transport

pub mod error;
pub mod headers;
pub mod memory;
pub mod redis_streams;
pub mod topology;
pub mod transport;

pub use error::{QueueError, QueueResult};
pub use headers::{
    HeaderValue, MessageHeaders, HEADER_FAILURE_REASON, HEADER_ORIGINAL_QUEUE, HEADER_RETRY_COUNT,
};
pub use memory::{InMemoryBroker, Settlement};
pub use redis_streams::{QueueConfig, RedisBroker};
pub use topology::{
    dead_letter_exchange, dead_letter_queue, DeadLetterTopology, PRIMARY_QUEUE, RESULT_QUEUE,
};
pub use transport::{BrokerTransport, Delivery, OutboundMessage, CONTENT_TYPE_JSON};
