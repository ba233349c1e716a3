//! Tracing setup and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use upframer_models::JobId;

/// Install the global subscriber.
///
/// `RUST_LOG` controls filtering on top of the `upframer=info` default.
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "upframer=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Lifecycle logging for one job attempt.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    retry_count: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, retry_count: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            retry_count,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, retry_count = self.retry_count, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, retry_count = self.retry_count, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, retry_count = self.retry_count, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, retry_count = self.retry_count, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, retry_count = self.retry_count, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the whole attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, retry_count = self.retry_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("job-123");
        let logger = JobLogger::new(&job_id, 2);

        assert_eq!(logger.job_id(), "job-123");
        logger.log_start("frames");
        logger.log_completion("frames");
    }
}
