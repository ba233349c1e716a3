//! Retry and dead-letter routing.
//!
//! The retry counter travels in the `x-retry-count` header and is the only
//! retry state there is. The decision is a pure function of the failure
//! class and that counter; [`RetryCoordinator`] carries it out against the
//! broker. Neither branch ever asks the broker to requeue the original
//! delivery: a requeue is a fresh publish followed by a drop.

use std::sync::Arc;

use tracing::{info, warn};

use upframer_models::{FailureRecord, RetryMetadata};
use upframer_queue::{BrokerTransport, Delivery, OutboundMessage, HEADER_RETRY_COUNT};

use crate::classifier::{classify, FailureClass};
use crate::error::{WorkerError, WorkerResult};
use crate::publisher::ResultPublisher;

/// Retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Requeues allowed before a retryable failure is dead-lettered.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

/// What happens to a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Republish to the original queue with the given counter.
    Requeue { next: RetryMetadata },
    /// Quarantine on the dead-letter queue.
    DeadLetter,
}

/// Routing decision for a failure. Pure.
pub fn decide(class: FailureClass, retry: RetryMetadata, policy: RetryPolicy) -> RetryDecision {
    if class.is_retryable() && retry.retry_count < policy.max_retries {
        RetryDecision::Requeue { next: retry.next() }
    } else {
        RetryDecision::DeadLetter
    }
}

/// Settles failed deliveries according to [`decide`].
pub struct RetryCoordinator {
    broker: Arc<dyn BrokerTransport>,
    publisher: Arc<ResultPublisher>,
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(
        broker: Arc<dyn BrokerTransport>,
        publisher: Arc<ResultPublisher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            publisher,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Requeue or dead-letter `delivery`, then drop the original.
    ///
    /// If the republish fails the original is left unsettled and the error
    /// is returned, so the broker redelivers it rather than losing it.
    pub async fn handle_failure(
        &self,
        delivery: &Delivery,
        error: &WorkerError,
    ) -> WorkerResult<(FailureClass, RetryDecision)> {
        let class = classify(error);
        let retry = delivery.headers.retry_metadata();
        let decision = decide(class, retry, self.policy);

        match decision {
            RetryDecision::Requeue { next } => {
                let mut headers = delivery.headers.clone();
                headers.insert(HEADER_RETRY_COUNT, next.retry_count);

                self.broker
                    .publish(
                        &delivery.queue,
                        OutboundMessage::json(delivery.body.clone()).with_headers(headers),
                    )
                    .await?;

                info!(
                    queue = %delivery.queue,
                    retry_count = next.retry_count,
                    max_retries = self.policy.max_retries,
                    class = class.as_str(),
                    "Requeued after failure: {}", error
                );
            }
            RetryDecision::DeadLetter => {
                let record = FailureRecord::new(
                    delivery.queue.as_str(),
                    error.to_string(),
                    retry,
                    delivery.body.clone(),
                );
                self.publisher.publish_failure(&record).await?;

                if class.is_retryable() {
                    warn!(
                        queue = %delivery.queue,
                        retry_count = retry.retry_count,
                        "Retries exhausted ({}), dead-lettered", self.policy.max_retries
                    );
                }
            }
        }

        self.broker.nack(delivery, false).await?;
        Ok((class, decision))
    }
}
