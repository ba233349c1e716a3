//! Frame extraction worker.
//!
//! This crate provides:
//! - The single-attempt job pipeline
//! - Failure classification and header-carried retry routing
//! - Result and dead-letter publishing
//! - The sequential executor loop
//! - Health and metrics endpoints

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod retry;

pub use classifier::{classify, FailureClass};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{DeliveryOutcome, JobExecutor};
pub use logging::JobLogger;
pub use pipeline::JobPipeline;
pub use publisher::ResultPublisher;
pub use retry::{decide, RetryCoordinator, RetryDecision, RetryPolicy};
