//! Frame extraction capability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Prefix shared by every extracted frame file.
pub const FRAME_PREFIX: &str = "frame_";
/// Extension of extracted frame files.
pub const FRAME_EXTENSION: &str = "jpg";

/// Frame extraction configuration.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Frames sampled per second of video
    pub frame_rate: u32,
    /// Optional hard limit on a single FFmpeg run
    pub timeout_secs: Option<u64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frame_rate: 1,
            timeout_secs: None,
        }
    }
}

impl ExtractionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            frame_rate: std::env::var("FRAME_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|fps| *fps > 0)
                .unwrap_or(1),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Outcome of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Directory holding the numbered frames
    pub output_dir: PathBuf,
    /// Number of frame files written
    pub frame_count: usize,
}

/// Turns a local video into numbered still images.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write `frame_0001.jpg`, `frame_0002.jpg`, ... into `output_dir`.
    async fn extract_frames(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> MediaResult<ExtractionReport>;
}

/// FFmpeg-backed extractor.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameExtractor {
    config: ExtractionConfig,
}

impl FfmpegFrameExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Output pattern understood by FFmpeg's image2 muxer.
    pub fn output_pattern(output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}%04d.{}", FRAME_PREFIX, FRAME_EXTENSION))
    }

    fn build_command(&self, video: &Path, output_dir: &Path) -> FfmpegCommand {
        FfmpegCommand::new(video, Self::output_pattern(output_dir))
            .frame_rate(self.config.frame_rate)
            .log_level("error")
    }

    fn runner(&self) -> FfmpegRunner {
        match self.config.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frames(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> MediaResult<ExtractionReport> {
        if !tokio::fs::try_exists(video).await.unwrap_or(false) {
            return Err(MediaError::InputNotFound(video.to_path_buf()));
        }

        let cmd = self.build_command(video, output_dir);
        self.runner()
            .run_with_progress(&cmd, |progress| {
                debug!(frame = progress.frame, speed = progress.speed, "Extraction progress");
            })
            .await?;

        let frame_count = count_frames(output_dir).await?;
        if frame_count == 0 {
            return Err(MediaError::NoFrames(output_dir.to_path_buf()));
        }

        info!(
            "Extracted {} frames from {} into {}",
            frame_count,
            video.display(),
            output_dir.display()
        );

        Ok(ExtractionReport {
            output_dir: output_dir.to_path_buf(),
            frame_count,
        })
    }
}

/// Count frame files in a directory.
pub async fn count_frames(dir: &Path) -> MediaResult<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(FRAME_PREFIX) && name.ends_with(FRAME_EXTENSION) {
            count += 1;
        }
    }

    Ok(count)
}
