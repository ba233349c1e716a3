//! Queue and dead-letter naming.

/// Queue the worker consumes jobs from.
pub const PRIMARY_QUEUE: &str = "job-creation";

/// Queue processing results are published to.
pub const RESULT_QUEUE: &str = "video-processing-result";

/// Dead-letter queue (and routing key) for `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dlq", queue)
}

/// Dead-letter exchange for `queue`. Distinct from the dead-letter queue name.
pub fn dead_letter_exchange(queue: &str) -> String {
    format!("{}.dlq.exchange", queue)
}

/// Broker objects that quarantine failed messages of one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterTopology {
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
}

impl DeadLetterTopology {
    pub fn for_queue(queue: &str) -> Self {
        let dlq = dead_letter_queue(queue);
        Self {
            exchange: dead_letter_exchange(queue),
            routing_key: dlq.clone(),
            queue: dlq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_names() {
        let topology = DeadLetterTopology::for_queue(PRIMARY_QUEUE);

        assert_eq!(topology.queue, "job-creation.dlq");
        assert_eq!(topology.routing_key, "job-creation.dlq");
        assert_eq!(topology.exchange, "job-creation.dlq.exchange");
        assert_ne!(topology.exchange, topology.queue);
    }
}
