use crate::zone::Rect;

/// One detected person, in pixel coordinates of the frame it was found in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionBox {
    pub rect: Rect,
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(rect: Rect, confidence: f32) -> Self {
        Self { rect, confidence }
    }
}

/// Returns true when at least one detection reaches into the restricted zone.
///
/// Each box is first clamped to the frame bounds. Boxes with nothing left after
/// clamping (entirely outside the frame) are ignored; boxes that only stick out of
/// the frame are evaluated on their visible part, so imprecise model output at the
/// frame edges does not produce false negatives.
pub fn detect_intrusion(bounds: Rect, boxes: &[DetectionBox], zone: Rect) -> bool {
    boxes.iter().any(|detection| {
        let visible = detection.rect.intersect(&bounds);
        !visible.is_empty() && visible.overlaps(&zone)
    })
}
