//! Shared wire models for the Upframer worker.
//!
//! This crate provides Serde-serializable types for:
//! - Inbound video jobs and their validation
//! - Outbound processing results
//! - Retry metadata and dead-letter failure records
//! - JSON Schemas of the queue payloads

pub mod failure;
pub mod job;
pub mod result;
pub mod schema;

pub use failure::{FailureRecord, RetryMetadata};
pub use job::{JobDecodeError, JobId, VideoJob};
pub use result::{JobStatus, ProcessingResult};
pub use schema::wire_schemas;
