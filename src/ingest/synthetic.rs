//! Synthetic frame source.
//!
//! Produces a grey scene with a single white "walker" that crosses the frame from
//! left to right and wraps around. Pairs with the stub detector for demos and
//! end-to-end tests without a camera or model.
//!
//! URL form: `stub://<name>[?frames=N&width=W&height=H]`. Without `frames` the
//! stream never ends.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use super::FrameSource;

const BACKGROUND: Rgb<u8> = Rgb([64, 64, 64]);
const WALKER: Rgb<u8> = Rgb([255, 255, 255]);
const WALKER_WIDTH: u32 = 40;
const WALKER_HEIGHT: u32 = 100;
const WALKER_STEP: u32 = 8;

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Number of frames before end of stream; `None` is endless.
    pub frames: Option<u64>,
    /// Nominal frame rate reported as the pacing hint.
    pub fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "scene".to_string(),
            width: 640,
            height: 480,
            frames: None,
            fps: 30,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source URL must start with stub://: {}", url))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut config = Self {
            name: name.to_string(),
            ..Self::default()
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid synthetic source option '{}'", pair))?;
            match key {
                "frames" => {
                    config.frames = Some(value.parse().context("invalid frames value")?);
                }
                "width" => config.width = value.parse().context("invalid width value")?,
                "height" => config.height = value.parse().context("invalid height value")?,
                "fps" => config.fps = value.parse().context("invalid fps value")?,
                other => return Err(anyhow!("unknown synthetic source option '{}'", other)),
            }
        }
        Ok(config)
    }
}

/// Synthetic frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: connected to stub://{} ({}x{})",
            config.name,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn render(&self) -> RgbImage {
        let SyntheticConfig { width, height, .. } = self.config;
        let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
        if width == 0 || height == 0 {
            return image;
        }

        let span = width + WALKER_WIDTH;
        let offset = ((self.frame_count * WALKER_STEP as u64) % span as u64) as u32;
        let left = offset.saturating_sub(WALKER_WIDTH);
        let right = offset.min(width);
        let top = height.saturating_sub(WALKER_HEIGHT) / 2;
        let bottom = (top + WALKER_HEIGHT).min(height);

        for y in top..bottom {
            for x in left..right {
                image.put_pixel(x, y, WALKER);
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn read_next(&mut self) -> Result<Option<RgbImage>> {
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(image))
    }

    fn fps_hint(&self) -> Option<f64> {
        (self.config.fps > 0).then_some(self.config.fps as f64)
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
