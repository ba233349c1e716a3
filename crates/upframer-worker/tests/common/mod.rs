//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use tempfile::TempDir;

use upframer_media::{ExtractionReport, FrameExtractor, MediaError, MediaResult};
use upframer_models::{JobId, VideoJob};
use upframer_queue::{
    BrokerTransport, InMemoryBroker, MessageHeaders, OutboundMessage, HEADER_RETRY_COUNT,
    PRIMARY_QUEUE,
};
use upframer_storage::{ObjectStore, RemoteReference, StorageKind, StorageResult, StoredArchive};
use upframer_worker::{JobExecutor, JobPipeline, WorkerConfig};

mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        fn kind(&self) -> StorageKind;
        async fn store_archive(
            &self,
            source_dir: &Path,
            archive_name: &str,
        ) -> StorageResult<StoredArchive>;
        async fn store_file(&self, file: &Path, name: &str) -> StorageResult<StoredArchive>;
        async fn fetch(&self, reference: &RemoteReference, destination: &Path) -> StorageResult<()>;
    }
}

/// Writes `frames` numbered JPEG stand-ins, or fails like FFmpeg when zero.
pub struct FakeExtractor {
    pub frames: usize,
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract_frames(
        &self,
        _video: &Path,
        output_dir: &Path,
    ) -> MediaResult<ExtractionReport> {
        if self.frames == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }
        for i in 1..=self.frames {
            tokio::fs::write(output_dir.join(format!("frame_{:04}.jpg", i)), b"jpeg").await?;
        }
        Ok(ExtractionReport {
            output_dir: output_dir.to_path_buf(),
            frame_count: self.frames,
        })
    }
}

pub struct Harness {
    pub broker: Arc<InMemoryBroker>,
    pub executor: Arc<JobExecutor>,
    pub work_dir: TempDir,
    pub input_dir: TempDir,
}

impl Harness {
    pub fn new(store: Arc<dyn ObjectStore>, extractor: Arc<dyn FrameExtractor>) -> Self {
        let work_dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            work_dir: work_dir.path().to_path_buf(),
            poll_block: Duration::from_millis(10),
            ..WorkerConfig::default()
        };
        Self::with_config(config, work_dir, store, extractor)
    }

    pub fn with_config(
        config: WorkerConfig,
        work_dir: TempDir,
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let pipeline = JobPipeline::new(store, extractor, config.work_dir.clone());
        let executor = Arc::new(JobExecutor::new(config, broker.clone(), pipeline));

        Self {
            broker,
            executor,
            work_dir,
            input_dir: TempDir::new().unwrap(),
        }
    }

    /// A source video that exists on local disk.
    pub fn local_video(&self) -> PathBuf {
        let path = self.input_dir.path().join("input.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    pub async fn send(&self, body: Vec<u8>, retry_count: Option<u32>) {
        let headers = match retry_count {
            Some(n) => MessageHeaders::new().with(HEADER_RETRY_COUNT, n),
            None => MessageHeaders::new(),
        };
        self.broker
            .publish(PRIMARY_QUEUE, OutboundMessage::json(body).with_headers(headers))
            .await
            .unwrap();
    }

    pub async fn send_job(
        &self,
        video_url: &str,
        job_id: &str,
        retry_count: Option<u32>,
    ) -> Vec<u8> {
        let body = job_body(video_url, job_id);
        self.send(body.clone(), retry_count).await;
        body
    }

    /// Everything left under the work dir.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_dir.path())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

pub fn job_body(video_url: &str, job_id: &str) -> Vec<u8> {
    VideoJob::new(video_url, "", JobId::from_string(job_id)).encode().unwrap()
}

/// Store mock that fails every archive upload with a transient error.
pub fn failing_store() -> MockStore {
    let mut store = MockStore::new();
    store.expect_kind().return_const(StorageKind::Remote);
    store
        .expect_store_archive()
        .returning(|_, _| Err(upframer_storage::StorageError::upload_failed("503 Slow Down")));
    store
}
