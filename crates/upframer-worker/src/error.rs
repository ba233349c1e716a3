//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job data: {0}")]
    InvalidJobData(String),

    #[error("Invalid source reference: {0}")]
    InvalidSourceFormat(String),

    #[error("Source file not found: {0}")]
    FileNotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Frame extraction failed: {0}")]
    ExtractionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] upframer_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] upframer_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] upframer_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job_data(msg: impl Into<String>) -> Self {
        Self::InvalidJobData(msg.into())
    }

    pub fn invalid_source_format(msg: impl Into<String>) -> Self {
        Self::InvalidSourceFormat(msg.into())
    }

    pub fn file_not_found(msg: impl Into<String>) -> Self {
        Self::FileNotFound(msg.into())
    }

    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn network_timeout(msg: impl Into<String>) -> Self {
        Self::NetworkTimeout(msg.into())
    }

    pub fn extraction_error(msg: impl Into<String>) -> Self {
        Self::ExtractionError(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
