//! Restricted zone geometry.
//!
//! Rectangles are half-open in image space: `min` is inclusive, `max` is exclusive.
//! The zone is recomputed for every frame because frame dimensions may change
//! between sources (or mid-stream for some cameras).

use std::fmt;

/// A point in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
    }

    /// Rectangle covering a whole frame of the given size.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, to_coord(width), to_coord(height))
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    /// Largest rectangle contained by both; empty when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if r.is_empty() {
            Rect::default()
        } else {
            r
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

/// Computes the restricted zone for a frame of `frame_cols` x `frame_rows`.
///
/// - Origin is `(origin_x, origin_y)` only when both are positive, otherwise `(0, 0)`.
/// - A non-positive width or height falls back to the full frame dimension.
pub fn compute_zone(
    origin_x: i32,
    origin_y: i32,
    width: i32,
    height: i32,
    frame_cols: u32,
    frame_rows: u32,
) -> Rect {
    let (x, y) = if origin_x > 0 && origin_y > 0 {
        (origin_x, origin_y)
    } else {
        (0, 0)
    };
    let w = if width <= 0 { to_coord(frame_cols) } else { width };
    let h = if height <= 0 { to_coord(frame_rows) } else { height };

    Rect::new(x, y, x.saturating_add(w), y.saturating_add(h))
}

/// Zone configuration baseline: what the operator asked for, before it is
/// resolved against a concrete frame size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ZoneGeometry {
    pub fn zone_for(&self, frame_cols: u32, frame_rows: u32) -> Rect {
        compute_zone(
            self.x,
            self.y,
            self.width,
            self.height,
            frame_cols,
            frame_rows,
        )
    }

    /// New baseline from an interactively selected region.
    pub fn from_selection(region: Rect) -> Self {
        Self {
            x: region.min.x,
            y: region.min.y,
            width: region.width(),
            height: region.height(),
        }
    }
}

impl fmt::Display for ZoneGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "--x={} --y={} --width={} --height={}",
            self.x, self.y, self.width, self.height
        )
    }
}

fn to_coord(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
