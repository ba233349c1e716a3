//! Processing results published on the result queue.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Terminal status of a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Outbound result message.
///
/// Wire format: `{ "outputPath": string, "status": "completed"|"failed", "jobId": string }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Durable reference to the stored frame archive
    pub output_path: String,
    pub status: JobStatus,
    pub job_id: JobId,
}

impl ProcessingResult {
    /// A completed result pointing at the stored archive.
    pub fn completed(job_id: JobId, output_path: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            status: JobStatus::Completed,
            job_id,
        }
    }

    /// A failed result with no output.
    pub fn failed(job_id: JobId) -> Self {
        Self {
            output_path: String::new(),
            status: JobStatus::Failed,
            job_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
