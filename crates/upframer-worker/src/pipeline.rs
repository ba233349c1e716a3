//! Single-attempt job pipeline.
//!
//! decode -> resolve source -> extract frames -> archive and store -> result.
//!
//! Every attempt runs inside a job-scoped workspace under the work dir that
//! holds the fetched source and the frames directory. The workspace is
//! removed on every exit path; a local source outside it is never touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::Instrument;

use upframer_media::{FrameExtractor, MediaError};
use upframer_models::{ProcessingResult, RetryMetadata, VideoJob};
use upframer_storage::{ObjectStore, RemoteReference, StorageError, StorageKind};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

const FRAMES_DIR: &str = "frames";

/// Runs one job attempt. Holds no per-job state between calls.
pub struct JobPipeline {
    store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn FrameExtractor>,
    work_dir: PathBuf,
}

impl JobPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn FrameExtractor>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            extractor,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run one attempt over a raw message body.
    pub async fn execute(
        &self,
        raw: &[u8],
        retry: RetryMetadata,
    ) -> WorkerResult<ProcessingResult> {
        let job = VideoJob::decode(raw).map_err(|e| WorkerError::invalid_job_data(e.to_string()))?;
        let logger = JobLogger::new(&job.job_id, retry.retry_count);

        self.execute_job(&job, &logger)
            .instrument(logger.create_span())
            .await
    }

    async fn execute_job(
        &self,
        job: &VideoJob,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessingResult> {
        logger.log_start(&job.video_url);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("job_{}_", job.job_id.file_stem()))
            .tempdir_in(&self.work_dir)?;

        let outcome = self.run_in(&workspace, job, logger).await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            logger.log_warning(&format!(
                "failed to remove workspace {}: {}",
                workspace_path.display(),
                e
            ));
        }

        match &outcome {
            Ok(result) => logger.log_completion(&result.output_path),
            Err(e) => logger.log_error(&e.to_string()),
        }
        outcome
    }

    async fn run_in(
        &self,
        workspace: &TempDir,
        job: &VideoJob,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessingResult> {
        let video = self.resolve_source(workspace.path(), job).await?;

        let frames_dir = workspace.path().join(FRAMES_DIR);
        tokio::fs::create_dir_all(&frames_dir).await?;

        let report = self
            .extractor
            .extract_frames(&video, &frames_dir)
            .await
            .map_err(extraction_failure)?;
        logger.log_progress(&format!("extracted {} frames", report.frame_count));

        let stored = self
            .store
            .store_archive(&frames_dir, &job.archive_name())
            .await
            .map_err(store_failure)?;
        logger.log_progress(&format!("stored archive at {}", stored.path));

        Ok(ProcessingResult::completed(job.job_id.clone(), stored.url))
    }

    /// Local path of the source video, fetching remote references into the
    /// workspace.
    async fn resolve_source(&self, workspace: &Path, job: &VideoJob) -> WorkerResult<PathBuf> {
        let reference = RemoteReference::parse(&job.video_url).map_err(|e| match e {
            StorageError::InvalidReference(msg) => WorkerError::invalid_source_format(msg),
            other => WorkerError::invalid_source_format(other.to_string()),
        })?;

        match reference {
            Some(reference) => {
                if self.store.kind() != StorageKind::Remote {
                    return Err(WorkerError::storage_unavailable(format!(
                        "remote source {} needs remote storage, running on {} storage",
                        job.video_url,
                        self.store.kind()
                    )));
                }

                let destination =
                    workspace.join(format!("temp_video_{}.mp4", job.job_id.file_stem()));
                self.store
                    .fetch(&reference, &destination)
                    .await
                    .map_err(fetch_failure)?;
                Ok(destination)
            }
            None => {
                let path = PathBuf::from(&job.video_url);
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(WorkerError::file_not_found(job.video_url.clone()));
                }
                Ok(path)
            }
        }
    }
}

fn fetch_failure(error: StorageError) -> WorkerError {
    match error {
        StorageError::NotFound(what) => WorkerError::file_not_found(what),
        StorageError::InvalidReference(msg) => WorkerError::invalid_source_format(msg),
        StorageError::Timeout(msg) => WorkerError::network_timeout(msg),
        other => WorkerError::storage_unavailable(other.to_string()),
    }
}

fn store_failure(error: StorageError) -> WorkerError {
    match error {
        StorageError::Timeout(msg) => WorkerError::network_timeout(msg),
        other => WorkerError::storage_unavailable(other.to_string()),
    }
}

fn extraction_failure(error: MediaError) -> WorkerError {
    match error.diagnostics() {
        Some(diagnostics) => WorkerError::extraction_error(format!("{}\n{}", error, diagnostics)),
        None => WorkerError::extraction_error(error.to_string()),
    }
}
