//! Local file frame source using FFmpeg.
//!
//! Decodes the best video track of a local file into RGB24 frames in-memory and
//! reports the stream's average frame rate as the playback pacing hint.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::FrameSource;

pub struct FfmpegFileSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: Option<f64>,
    frame_count: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open file input '{}'", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = f64::from(input_stream.avg_frame_rate());
        let fps = (rate.is_finite() && rate > 0.0).then_some(rate);
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: opened {} ({}x{}, {:?} fps)",
            path.display(),
            decoder.width(),
            decoder.height(),
            fps
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            fps,
            frame_count: 0,
            eof_sent: false,
        })
    }

    /// Pull one already-decoded frame out of the decoder, if any.
    fn receive(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        self.frame_count += 1;
        frame_to_image(&rgb_frame).map(Some)
    }
}

impl FrameSource for FfmpegFileSource {
    fn read_next(&mut self) -> Result<Option<RgbImage>> {
        if let Some(image) = self.receive()? {
            return Ok(Some(image));
        }

        while let Some((stream, packet)) = self.input.packets().next() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if let Some(image) = self.receive()? {
                return Ok(Some(image));
            }
        }

        // Input exhausted: flush frames still buffered in the decoder.
        if !self.eof_sent {
            self.decoder.send_eof().context("flush ffmpeg decoder")?;
            self.eof_sent = true;
        }
        self.receive()
    }

    fn fps_hint(&self) -> Option<f64> {
        self.fps
    }

    fn close(&mut self) {
        log::debug!(
            "FileSource: closing {} after {} frames",
            self.path.display(),
            self.frame_count
        );
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("decoded frame does not match {}x{} RGB", width, height))
}
