#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::PersonDetector;
use crate::detect::result::DetectionBox;
use crate::detect::ssd::decode_ssd_rows;

/// Network input width expected by the pedestrian detection model.
pub const INPUT_WIDTH: u32 = 672;
/// Network input height expected by the pedestrian detection model.
pub const INPUT_HEIGHT: u32 = 384;

/// Tract-based backend for ONNX person detection.
///
/// Loads a local SSD-style model and runs it on CPU. Frames are resized to the
/// network input; boxes are scaled back to the original frame size.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    confidence_threshold: f32,
    last_latency_ms: f64,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            confidence_threshold: 0.5,
            last_latency_ms: 0.0,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let resized = imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);
        bgr_planes(&resized).into_tensor()
    }
}

/// NCHW planes in the B, G, R order the pedestrian model was trained on.
fn bgr_planes(image: &RgbImage) -> tract_ndarray::Array4<f32> {
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, image.height() as usize, image.width() as usize),
        |(_, plane, y, x)| image.get_pixel(x as u32, y as u32).0[2 - plane] as f32,
    )
}

impl PersonDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_persons(&mut self, image: &RgbImage) -> Result<Vec<DetectionBox>> {
        let started = Instant::now();
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.last_latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();

        Ok(decode_ssd_rows(
            &rows,
            image.width(),
            image.height(),
            self.confidence_threshold,
        ))
    }

    fn last_latency_ms(&self) -> f64 {
        self.last_latency_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn input_planes_are_blue_green_red() {
        let image = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let planes = bgr_planes(&image);
        assert_eq!(planes.shape(), &[1, 3, 1, 2]);
        assert_eq!(planes[[0, 0, 0, 1]], 30.0);
        assert_eq!(planes[[0, 1, 0, 1]], 20.0);
        assert_eq!(planes[[0, 2, 0, 0]], 10.0);
    }
}
