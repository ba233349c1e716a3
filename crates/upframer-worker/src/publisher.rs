//! Result and dead-letter publishing.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use upframer_models::{FailureRecord, ProcessingResult};
use upframer_queue::{BrokerTransport, DeadLetterTopology, MessageHeaders, OutboundMessage};

use crate::error::{WorkerError, WorkerResult};

/// Publishes result records and dead-lettered jobs.
///
/// Target queues are declared on first use; a failed declaration is retried
/// on the next publish.
pub struct ResultPublisher {
    broker: Arc<dyn BrokerTransport>,
    result_queue: String,
    dead_letter: DeadLetterTopology,
    result_declared: OnceCell<()>,
    dead_letter_declared: OnceCell<()>,
}

impl ResultPublisher {
    /// `source_queue` is the queue whose failures are dead-lettered here.
    pub fn new(
        broker: Arc<dyn BrokerTransport>,
        result_queue: impl Into<String>,
        source_queue: &str,
    ) -> Self {
        Self {
            broker,
            result_queue: result_queue.into(),
            dead_letter: DeadLetterTopology::for_queue(source_queue),
            result_declared: OnceCell::new(),
            dead_letter_declared: OnceCell::new(),
        }
    }

    pub fn result_queue(&self) -> &str {
        &self.result_queue
    }

    pub fn dead_letter(&self) -> &DeadLetterTopology {
        &self.dead_letter
    }

    /// Publish a result record. Returns only once the broker accepted it.
    pub async fn publish_result(&self, result: &ProcessingResult) -> WorkerResult<()> {
        self.result_declared
            .get_or_try_init(|| async {
                self.broker.declare_queue(&self.result_queue).await?;
                debug!("Declared result queue {}", self.result_queue);
                Ok::<_, WorkerError>(())
            })
            .await?;

        let body = serde_json::to_vec(result)?;

        self.broker
            .publish(&self.result_queue, OutboundMessage::json(body))
            .await?;

        info!(
            job_id = %result.job_id,
            status = result.status.as_str(),
            "Published result to {}", self.result_queue
        );
        Ok(())
    }

    /// Route a failed job's original body to the dead-letter queue.
    pub async fn publish_failure(&self, record: &FailureRecord) -> WorkerResult<()> {
        self.dead_letter_declared
            .get_or_try_init(|| async {
                self.broker.declare_dead_letter(&self.dead_letter).await?;
                debug!(
                    "Declared dead-letter exchange {} -> {}",
                    self.dead_letter.exchange, self.dead_letter.queue
                );
                Ok::<_, WorkerError>(())
            })
            .await?;

        let message = OutboundMessage::json(record.original_body.clone())
            .with_headers(MessageHeaders::for_failure(record));

        self.broker
            .publish_to_exchange(&self.dead_letter.exchange, &self.dead_letter.routing_key, message)
            .await?;

        warn!(
            queue = %record.original_queue,
            retry_count = record.retry_count,
            "Dead-lettered message: {}", record.reason
        );
        Ok(())
    }
}
