//! FFmpeg frame extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - The `FrameExtractor` capability and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod extractor;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extractor::{ExtractionConfig, ExtractionReport, FfmpegFrameExtractor, FrameExtractor};
pub use progress::FfmpegProgress;
