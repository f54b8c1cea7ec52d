//! Decoding of SSD-style detection output.
//!
//! The network emits a flat `[1, 1, N, 7]` tensor. Each row is
//! `(image_id, label, confidence, x_min, y_min, x_max, y_max)` with coordinates
//! normalized to `0..1` relative to the input frame.

use crate::detect::result::DetectionBox;
use crate::zone::Rect;

pub const SSD_ROW_LEN: usize = 7;

/// Converts raw output rows into pixel-space boxes, keeping rows strictly above
/// `threshold`. Trailing partial rows are ignored.
pub fn decode_ssd_rows(output: &[f32], cols: u32, rows: u32, threshold: f32) -> Vec<DetectionBox> {
    let cols = cols as f32;
    let rows = rows as f32;

    output
        .chunks_exact(SSD_ROW_LEN)
        .filter(|row| row[2] > threshold)
        .map(|row| {
            let rect = Rect::new(
                (row[3] * cols) as i32,
                (row[4] * rows) as i32,
                (row[5] * cols) as i32,
                (row[6] * rows) as i32,
            );
            DetectionBox::new(rect, row[2])
        })
        .collect()
}
