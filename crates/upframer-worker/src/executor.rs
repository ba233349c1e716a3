//! Job executor.
//!
//! Drains deliveries one at a time. Each delivery gets exactly one
//! settlement: ack after the result is published, or the retry
//! coordinator's requeue / dead-letter followed by a nack without requeue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use upframer_queue::{BrokerTransport, Delivery};

use crate::classifier::FailureClass;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::pipeline::JobPipeline;
use crate::publisher::ResultPublisher;
use crate::retry::{RetryCoordinator, RetryDecision};

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Completed,
    Requeued { retry_count: u32 },
    DeadLettered { class: FailureClass },
}

/// Consumes the primary queue until shut down.
pub struct JobExecutor {
    config: WorkerConfig,
    broker: Arc<dyn BrokerTransport>,
    pipeline: JobPipeline,
    publisher: Arc<ResultPublisher>,
    coordinator: RetryCoordinator,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn BrokerTransport>,
        pipeline: JobPipeline,
    ) -> Self {
        let publisher = Arc::new(ResultPublisher::new(
            broker.clone(),
            config.result_queue.clone(),
            &config.queue,
        ));
        let coordinator =
            RetryCoordinator::new(broker.clone(), publisher.clone(), config.retry_policy());
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            broker,
            pipeline,
            publisher,
            coordinator,
            shutdown,
        }
    }

    /// Declare the consumed queue. Idempotent.
    pub async fn init(&self) -> WorkerResult<()> {
        self.broker.declare_queue(&self.config.queue).await?;
        Ok(())
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    ///
    /// Returns an error only when a delivery could not be settled; the
    /// broker connection is then suspect and the process should exit.
    pub async fn run(&self) -> WorkerResult<()> {
        self.init().await?;
        info!(
            queue = %self.config.queue,
            max_retries = self.config.max_retries,
            "Starting job executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        while !*shutdown_rx.borrow() {
            // The poll is bounded by poll_block and always runs to completion, so a
            // delivery already claimed by this consumer is handled rather than left
            // pending until the visibility timeout.
            match self
                .broker
                .next_delivery(&self.config.queue, self.config.poll_block)
                .await
            {
                Ok(Some(delivery)) => {
                    self.handle_delivery(delivery).await?;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Error polling {}: {}", self.config.queue, e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(POLL_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Process at most one delivery. Returns `None` when nothing arrived.
    pub async fn process_next(&self) -> WorkerResult<Option<DeliveryOutcome>> {
        match self
            .broker
            .next_delivery(&self.config.queue, self.config.poll_block)
            .await?
        {
            Some(delivery) => Ok(Some(self.handle_delivery(delivery).await?)),
            None => Ok(None),
        }
    }

    /// Run the pipeline over one delivery and settle it.
    pub async fn handle_delivery(&self, delivery: Delivery) -> WorkerResult<DeliveryOutcome> {
        let retry = delivery.headers.retry_metadata();
        debug!(
            tag = %delivery.tag,
            retry_count = retry.retry_count,
            redelivered = delivery.redelivered,
            "Received delivery"
        );
        let started = Instant::now();

        let attempt = match self.pipeline.execute(&delivery.body, retry).await {
            Ok(result) => self.publisher.publish_result(&result).await,
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match attempt {
            Ok(()) => {
                self.broker.ack(&delivery).await?;
                metrics::record_completed(elapsed);
                Ok(DeliveryOutcome::Completed)
            }
            Err(failure) => {
                let (class, decision) = self
                    .coordinator
                    .handle_failure(&delivery, &failure)
                    .await
                    .inspect_err(|e| {
                        error!(
                            tag = %delivery.tag,
                            "Failed to settle delivery after '{}': {}", failure, e
                        )
                    })?;
                metrics::record_failed(class, elapsed);

                match decision {
                    RetryDecision::Requeue { next } => {
                        metrics::record_requeued();
                        Ok(DeliveryOutcome::Requeued {
                            retry_count: next.retry_count,
                        })
                    }
                    RetryDecision::DeadLetter => {
                        metrics::record_dead_lettered(class);
                        Ok(DeliveryOutcome::DeadLettered { class })
                    }
                }
            }
        }
    }

    /// Signal shutdown. The current job, if any, runs to completion.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}
