//! Screen-space geometry shared by the gaze, dwell, and calibration layers.
//!
//! All coordinates are CSS-style pixels with the origin at the top-left
//! corner of the viewport.

use serde::{Deserialize, Serialize};

// ── Point ───────────────────────────────────────────────────

/// A position on screen in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// ── Rect ────────────────────────────────────────────────────

/// Axis-aligned bounding box of an interactive element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build a rect from its top-left corner and size.
    pub fn from_origin_size(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    /// Build a square rect of side `size` centered on `center`.
    pub fn centered(center: Point, size: f64) -> Self {
        let half = size / 2.0;
        Self::new(center.x - half, center.y - half, center.x + half, center.y + half)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2.0,
            self.top + self.height() / 2.0,
        )
    }

    /// The rect grown by `padding` on every side.
    pub fn padded(&self, padding: f64) -> Rect {
        Rect::new(
            self.left - padding,
            self.top - padding,
            self.right + padding,
            self.bottom + padding,
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }
}

// ── Viewport ────────────────────────────────────────────────

/// Visible area that percentage layouts are resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Resolve a percentage position (0-100 on each axis) to pixels.
    pub fn resolve(&self, pct: PercentPoint) -> Point {
        Point::new(pct.x / 100.0 * self.width, pct.y / 100.0 * self.height)
    }

    /// Parse a "WxH" string. Returns None on malformed or non-positive input.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once('x')?;
        let w = w.trim().parse::<f64>().ok()?;
        let h = h.trim().parse::<f64>().ok()?;
        if w > 0.0 && h > 0.0 {
            Some(Self::new(w, h))
        } else {
            None
        }
    }
}

/// A position expressed as percentages of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentPoint {
    pub x: f64,
    pub y: f64,
}

impl PercentPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
