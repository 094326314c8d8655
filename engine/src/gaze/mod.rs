//! Gaze signal conditioning: adaptive smoothing, outlier rejection,
//! target snapping, and tracking health.
//!
//! Raw samples come from an external estimator at an irregular rate and
//! may be absent (no face detected). The processor turns them into one
//! stabilized point per valid sample; absent samples only feed the health
//! counters.

pub mod health;
pub mod processor;
pub mod smoother;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::geometry::Point;

pub use health::GazeHealth;
pub use processor::{snap_to_nearest, GazeProcessor};
pub use smoother::GazeSmoother;

/// One estimate from the gaze source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGazeSample {
    pub x: f64,
    pub y: f64,
    pub timestamp: Instant,
}

impl RawGazeSample {
    pub fn new(x: f64, y: f64, timestamp: Instant) -> Self {
        Self { x, y, timestamp }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Output of the conditioning pipeline. Recomputed per sample, never stored.
pub type StabilizedPoint = Point;

// ── Config ──────────────────────────────────────────────────

/// Tuning for the gaze pipeline.
///
/// The snap radius and outlier threshold were tuned by hand against a
/// webcam estimator; validate them against real accuracy data before
/// relying on the defaults for other hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Snap to a target center closer than this many pixels.
    pub snap_radius_px: f64,
    /// Reject a raw sample farther than this from the window median.
    pub outlier_threshold_px: f64,
    /// Number of raw samples kept for the median.
    pub history_size: usize,
    /// The outlier test only engages once the window holds this many samples.
    pub outlier_min_history: usize,
    /// Smoothing factor used near fixation.
    pub alpha_min: f64,
    /// Smoothing factor ceiling during fast movement.
    pub alpha_max: f64,
    /// Multiplier from speed (px/ms) to smoothing factor.
    pub alpha_gain: f64,
    /// Consecutive absent samples before tracking counts as lost.
    pub lost_after_samples: u32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            snap_radius_px: 150.0,
            outlier_threshold_px: 200.0,
            history_size: 15,
            outlier_min_history: 5,
            alpha_min: 0.1,
            alpha_max: 0.6,
            alpha_gain: 2.0,
            lost_after_samples: 30,
        }
    }
}
