//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Remote storage initialization failed: {0}")]
    RemoteInitFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Storage request timed out: {0}")]
    Timeout(String),

    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn archive_failed(msg: impl Into<String>) -> Self {
        Self::ArchiveFailed(msg.into())
    }

    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout(_))
    }
}

impl From<zip::result::ZipError> for StorageError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::ArchiveFailed(e.to_string())
    }
}

impl From<walkdir::Error> for StorageError {
    fn from(e: walkdir::Error) -> Self {
        Self::ArchiveFailed(e.to_string())
    }
}
