//! Failure classification.

use std::fmt;

use crate::error::WorkerError;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Retrying cannot succeed.
    Permanent,
    /// Retrying may succeed.
    Temporary,
    /// Not recognised; retried like a temporary failure.
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Permanent => "permanent",
            FailureClass::Temporary => "temporary",
            FailureClass::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureClass::Permanent)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure. Pure.
///
/// Wrapped collaborator errors that the pipeline did not translate into a
/// taxonomy variant are `Unknown`.
pub fn classify(error: &WorkerError) -> FailureClass {
    match error {
        WorkerError::InvalidJobData(_)
        | WorkerError::InvalidSourceFormat(_)
        | WorkerError::FileNotFound(_) => FailureClass::Permanent,

        WorkerError::StorageUnavailable(_)
        | WorkerError::NetworkTimeout(_)
        | WorkerError::ExtractionError(_) => FailureClass::Temporary,

        WorkerError::ConfigError(_)
        | WorkerError::Storage(_)
        | WorkerError::Media(_)
        | WorkerError::Queue(_)
        | WorkerError::Json(_)
        | WorkerError::Io(_) => FailureClass::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upframer_queue::QueueError;

    #[test]
    fn test_permanent_failures() {
        for error in [
            WorkerError::invalid_job_data("missing jobId"),
            WorkerError::invalid_source_format("s3://bucket/"),
            WorkerError::file_not_found("/videos/gone.mp4"),
        ] {
            assert_eq!(classify(&error), FailureClass::Permanent, "{}", error);
        }
    }

    #[test]
    fn test_temporary_failures() {
        for error in [
            WorkerError::storage_unavailable("bucket unreachable"),
            WorkerError::network_timeout("get_object"),
            WorkerError::extraction_error("ffmpeg exited with 1"),
        ] {
            assert_eq!(classify(&error), FailureClass::Temporary, "{}", error);
        }
    }

    #[test]
    fn test_everything_else_is_unknown_and_retryable() {
        let error = WorkerError::from(QueueError::publish_failed("channel closed"));
        let class = classify(&error);

        assert_eq!(class, FailureClass::Unknown);
        assert!(class.is_retryable());
        assert!(!FailureClass::Permanent.is_retryable());
    }
}
