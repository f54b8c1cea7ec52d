//! Frames and per-frame detection reports.
//!
//! - `Frame`: owned image plus the zone snapshot active when it was captured.
//!   Not `Clone`: a frame is moved into the detection worker and dropped there.
//! - `ZoneReport`: the immutable outcome of one detection pass. `Copy`, so each
//!   consumer gets its own value.
//! - `SafetyMessage`: the telemetry payload derived from a report.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::zone::Rect;

/// Captured image travelling to the detection worker.
///
/// The zone travels with the image so the worker never reads orchestrator state.
pub struct Frame {
    pub image: RgbImage,
    pub zone: Rect,
}

// Explicitly NOT implementing Clone: ownership moves across the mailbox.

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("zone", &self.zone)
            .finish()
    }
}

impl Frame {
    pub fn new(image: RgbImage, zone: Rect) -> Self {
        Self { image, zone }
    }

    /// Full extent of the image, used to discard out-of-frame detections.
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.image.width(), self.image.height())
    }
}

/// Inference performance for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerfInfo {
    /// Inference latency in milliseconds.
    pub net_ms: f64,
}

impl PerfInfo {
    pub fn from_ms(net_ms: f64) -> Self {
        Self { net_ms }
    }
}

impl fmt::Display for PerfInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inference time: {:.2} ms", self.net_ms)
    }
}

/// Outcome of one detection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ZoneReport {
    /// A person was detected inside the restricted zone.
    pub alert: bool,
    pub perf: PerfInfo,
}

impl ZoneReport {
    pub fn new(alert: bool, perf: PerfInfo) -> Self {
        Self { alert, perf }
    }

    pub fn is_safe(&self) -> bool {
        !self.alert
    }
}

impl fmt::Display for ZoneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Safe {}", self.is_safe())
    }
}

/// Telemetry payload: `{"Safe": <bool>}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyMessage {
    #[serde(rename = "Safe")]
    pub safe: bool,
}

impl From<ZoneReport> for SafetyMessage {
    fn from(report: ZoneReport) -> Self {
        Self {
            safe: report.is_safe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_formats_like_overlay_text() {
        let report = ZoneReport::new(true, PerfInfo::from_ms(12.345));
        assert_eq!(report.to_string(), "Safe false");
        assert_eq!(report.perf.to_string(), "Inference time: 12.35 ms");
    }

    #[test]
    fn safety_message_inverts_alert() {
        let alert = SafetyMessage::from(ZoneReport::new(true, PerfInfo::default()));
        let clear = SafetyMessage::from(ZoneReport::new(false, PerfInfo::default()));
        assert_eq!(serde_json::to_string(&alert).unwrap(), r#"{"Safe":false}"#);
        assert_eq!(serde_json::to_string(&clear).unwrap(), r#"{"Safe":true}"#);
    }

    #[test]
    fn frame_bounds_match_image() {
        let frame = Frame::new(RgbImage::new(640, 480), Rect::new(0, 0, 10, 10));
        assert_eq!(frame.bounds(), Rect::new(0, 0, 640, 480));
    }
}
