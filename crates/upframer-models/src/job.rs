//! Inbound job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// Longest job ID used verbatim in a file name.
const MAX_VERBATIM_STEM: usize = 64;
/// Characters of a sanitized ID kept ahead of its digest tag.
const SANITIZED_PREFIX_LEN: usize = 48;

/// Unique identifier for a job, assigned by the producer.
///
/// Any non-empty string is accepted; use [`JobId::file_stem`] wherever the ID
/// becomes part of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe form of the ID.
    ///
    /// Short IDs made of `[A-Za-z0-9_-]` pass through unchanged. Anything else
    /// is reduced to that alphabet and tagged with a digest of the raw ID, so
    /// distinct IDs never share a stem.
    pub fn file_stem(&self) -> String {
        let is_safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if self.0.len() <= MAX_VERBATIM_STEM && self.0.chars().all(is_safe) {
            return self.0.clone();
        }

        let prefix: String = self
            .0
            .chars()
            .map(|c| if is_safe(c) { c } else { '_' })
            .take(SANITIZED_PREFIX_LEN)
            .collect();
        let digest = Sha256::digest(self.0.as_bytes());
        let tag: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}-{}", prefix, tag)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors produced while decoding an inbound message body.
#[derive(Debug, Error)]
pub enum JobDecodeError {
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid job data: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// A frame extraction job as it travels on the wire.
///
/// Wire format: `{ "videoUrl": string, "outputPath": string, "jobId": string }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoJob {
    /// Local path or remote object reference of the source video
    #[validate(length(min = 1))]
    pub video_url: String,

    /// Producer-supplied output hint
    #[serde(default)]
    pub output_path: String,

    /// Job ID; job-scoped files are named from its `file_stem`
    #[validate(custom(function = "validate_job_id"))]
    pub job_id: JobId,
}

impl VideoJob {
    pub fn new(
        video_url: impl Into<String>,
        output_path: impl Into<String>,
        job_id: JobId,
    ) -> Self {
        Self {
            video_url: video_url.into(),
            output_path: output_path.into(),
            job_id,
        }
    }

    /// Decode and validate a raw message body.
    pub fn decode(raw: &[u8]) -> Result<Self, JobDecodeError> {
        let job: VideoJob = serde_json::from_slice(raw)?;
        job.validate()?;
        Ok(job)
    }

    /// Encode to the wire format.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deterministic archive name for this job's frames.
    pub fn archive_name(&self) -> String {
        format!("frames_{}.zip", self.job_id.file_stem())
    }
}

fn validate_job_id(job_id: &JobId) -> Result<(), ValidationError> {
    if job_id.as_str().is_empty() {
        return Err(ValidationError::new("job_id_empty"));
    }
    Ok(())
}
