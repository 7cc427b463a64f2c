//! Video decoding boundary.
//!
//! The video pipeline consumes pre-recorded files through the
//! [`VideoSource`] trait; the production implementation in [`ffmpeg`] shells
//! out to ffprobe/ffmpeg.

pub mod ffmpeg;

use anyhow::Result;
use image::RgbImage;
use std::path::Path;

pub use ffmpeg::FfmpegVideoSource;

/// Opens video files for sequential decoding.
pub trait VideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoReader>>;
}

/// Sequential frame reader over one opened video.
pub trait VideoReader {
    /// Total frames as reported by the container; 0 when unknown.
    fn frame_count(&self) -> i64;

    /// Frames per second; 0.0 when unknown.
    fn fps(&self) -> f64;

    /// The next decoded frame, or None at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}
