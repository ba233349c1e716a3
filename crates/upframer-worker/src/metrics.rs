//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::classifier::FailureClass;
use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            WorkerError::config_error(format!("failed to install metrics recorder: {}", e))
        })
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "upframer_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "upframer_jobs_failed_total";
    pub const JOBS_REQUEUED_TOTAL: &str = "upframer_jobs_requeued_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "upframer_jobs_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "upframer_job_duration_seconds";
}

pub fn record_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "completed").record(duration_secs);
}

pub fn record_failed(class: FailureClass, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "class" => class.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "status" => "failed").record(duration_secs);
}

pub fn record_requeued() {
    counter!(names::JOBS_REQUEUED_TOTAL).increment(1);
}

pub fn record_dead_lettered(class: FailureClass) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, "class" => class.as_str()).increment(1);
}
