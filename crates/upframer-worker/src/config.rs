//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use upframer_queue::{PRIMARY_QUEUE, RESULT_QUEUE};

use crate::retry::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue jobs are consumed from
    pub queue: String,
    /// Queue results are published to
    pub result_queue: String,
    /// Requeues allowed before a retryable failure is dead-lettered
    pub max_retries: u32,
    /// Parent of the job-scoped workspaces
    pub work_dir: PathBuf,
    /// How long one poll waits for a delivery
    pub poll_block: Duration,
    /// Port of the health and metrics server
    pub health_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: PRIMARY_QUEUE.to_string(),
            result_queue: RESULT_QUEUE.to_string(),
            max_retries: 3,
            work_dir: PathBuf::from("/tmp/upframer"),
            poll_block: Duration::from_millis(1000),
            health_port: 8080,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            queue: lookup("WORKER_QUEUE").unwrap_or(defaults.queue),
            result_queue: lookup("WORKER_RESULT_QUEUE").unwrap_or(defaults.result_queue),
            max_retries: lookup("WORKER_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            work_dir: lookup("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            poll_block: lookup("WORKER_POLL_BLOCK_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_block),
            health_port: lookup("WORKER_HEALTH_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.health_port),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}
