use anyhow::Result;
use image::RgbImage;
use std::time::Instant;

use crate::detect::backend::PersonDetector;
use crate::detect::result::DetectionBox;
use crate::zone::Rect;

/// Channel value at or above which a pixel counts as part of a "person".
const BRIGHT_LEVEL: u8 = 240;

/// Stub backend for demos and tests.
///
/// Treats the bounding box of near-white pixels as a single person. Pairs with
/// the synthetic frame source, which paints a white walker over a grey scene.
/// Confidence is the fill ratio of the box, so a solid blob scores 1.0.
pub struct StubBackend {
    threshold: f32,
    last_latency_ms: f64,
}

impl StubBackend {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_latency_ms: 0.0,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl PersonDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect_persons(&mut self, image: &RgbImage) -> Result<Vec<DetectionBox>> {
        let started = Instant::now();

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let mut bright = 0u64;
        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0.iter().all(|&c| c >= BRIGHT_LEVEL) {
                bright += 1;
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let detections = match bounds {
            Some((x0, y0, x1, y1)) => {
                let rect = Rect::new(x0 as i32, y0 as i32, x1 as i32 + 1, y1 as i32 + 1);
                let area = (rect.width() as u64) * (rect.height() as u64);
                let confidence = bright as f32 / area as f32;
                if confidence > self.threshold {
                    vec![DetectionBox::new(rect, confidence)]
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        self.last_latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(detections)
    }

    fn last_latency_ms(&self) -> f64 {
        self.last_latency_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scene_with_blob(x0: u32, y0: u32, x1: u32, y1: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]));
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        image
    }

    #[test]
    fn stub_backend_finds_bright_blob() {
        let mut backend = StubBackend::default();
        let boxes = backend
            .detect_persons(&scene_with_blob(10, 5, 20, 25))
            .unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].rect, Rect::new(10, 5, 20, 25));
        assert_eq!(boxes[0].confidence, 1.0);
        assert!(backend.last_latency_ms() >= 0.0);
    }

    #[test]
    fn stub_backend_reports_nothing_on_dark_scene() {
        let mut backend = StubBackend::default();
        let image = RgbImage::from_pixel(32, 32, Rgb([10, 10, 10]));
        assert!(backend.detect_persons(&image).unwrap().is_empty());
    }

    #[test]
    fn sparse_bright_pixels_fall_below_threshold() {
        let mut backend = StubBackend::new(0.5);
        let mut image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        image.put_pixel(31, 31, Rgb([255, 255, 255]));
        assert!(backend.detect_persons(&image).unwrap().is_empty());
    }
}
