//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic scenes (`stub://` inputs, always available)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 camera devices (feature: ingest-v4l2)
//!
//! Every source yields owned RGB images. `Ok(None)` marks a clean end of
//! stream; `Err` is a capture failure and is fatal to the pipeline.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegFileSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// A stream of frames: a live camera or a file.
///
/// Sources stay on the orchestrator thread, so they need not be `Send`.
pub trait FrameSource {
    /// Next image, or `None` once the stream has no more frames.
    fn read_next(&mut self) -> Result<Option<RgbImage>>;

    /// Native frame rate, when the source knows it (file-backed streams).
    fn fps_hint(&self) -> Option<f64> {
        None
    }

    /// Release the underlying device or file.
    fn close(&mut self) {}

    /// Human-readable source description for logs.
    fn describe(&self) -> String;
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSelection {
    /// Path to a video file, or a `stub://` synthetic scene.
    File(PathBuf),
    /// Camera device index (`/dev/video<N>`).
    Device(u32),
}

impl InputSelection {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::File(path) if path.to_string_lossy().starts_with("stub://"))
    }
}

/// Open the source described by `input`.
pub fn open_source(input: &InputSelection) -> Result<Box<dyn FrameSource>> {
    match input {
        InputSelection::File(path) if input.is_synthetic() => {
            let config = SyntheticConfig::from_url(&path.to_string_lossy())?;
            Ok(Box::new(SyntheticSource::new(config)))
        }
        InputSelection::File(path) => open_file(path),
        InputSelection::Device(index) => open_device(*index),
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(path: &std::path::Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegFileSource::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(path: &std::path::Path) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "cannot open {}: file ingestion requires the ingest-file-ffmpeg feature",
        path.display()
    )
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    let config = V4l2Config {
        device: format!("/dev/video{index}"),
        ..V4l2Config::default()
    };
    Ok(Box::new(V4l2Source::open(config)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("camera device {index} requires the ingest-v4l2 feature")
}
