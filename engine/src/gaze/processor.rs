//! The full gaze pipeline: health accounting, smoothing, snapping.

use tracing::{debug, info};

use super::{GazeConfig, GazeHealth, GazeSmoother, RawGazeSample, StabilizedPoint};
use crate::geometry::Point;

/// Bias `point` toward the nearest target center strictly within `radius`.
///
/// Webcam estimators carry a few degrees of systematic error, so a point
/// near an interactive element is assumed to be aimed at it.
pub fn snap_to_nearest<I>(point: Point, centers: I, radius: f64) -> Point
where
    I: IntoIterator<Item = Point>,
{
    let mut best: Option<(f64, Point)> = None;
    for c in centers {
        let d = point.distance(c);
        if d < radius && best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, c));
        }
    }
    best.map(|(_, c)| c).unwrap_or(point)
}

/// Converts the raw sample stream into stabilized, optionally snapped points.
#[derive(Debug, Clone)]
pub struct GazeProcessor {
    pub config: GazeConfig,
    smoother: GazeSmoother,
    health: GazeHealth,
    /// Snapping is off while calibration or the tour needs raw precision.
    snapping_suppressed: bool,
    last_point: Option<StabilizedPoint>,
}

impl GazeProcessor {
    pub fn new(config: GazeConfig) -> Self {
        info!(
            "Gaze processor initialized (snap {}px, outlier {}px, window {})",
            config.snap_radius_px, config.outlier_threshold_px, config.history_size
        );
        Self {
            smoother: GazeSmoother::new(&config),
            health: GazeHealth::new(config.lost_after_samples),
            snapping_suppressed: false,
            last_point: None,
            config,
        }
    }

    /// Process one sample from the source. `None` means no face was
    /// detected: it is counted and otherwise ignored, never read as (0,0).
    pub fn process(
        &mut self,
        sample: Option<RawGazeSample>,
        target_centers: &[Point],
    ) -> Option<StabilizedPoint> {
        let sample = match sample {
            Some(s) => s,
            None => {
                self.health.record_absent();
                return None;
            }
        };
        self.health.record_valid(sample.timestamp);

        let smoothed = self.smoother.update(sample);
        let point = if self.snapping_suppressed {
            smoothed
        } else {
            snap_to_nearest(
                smoothed,
                target_centers.iter().copied(),
                self.config.snap_radius_px,
            )
        };
        self.last_point = Some(point);
        Some(point)
    }

    pub fn set_snapping_suppressed(&mut self, suppressed: bool) {
        if self.snapping_suppressed != suppressed {
            debug!("Gaze snapping {}", if suppressed { "suppressed" } else { "enabled" });
        }
        self.snapping_suppressed = suppressed;
    }

    pub fn snapping_suppressed(&self) -> bool {
        self.snapping_suppressed
    }

    pub fn health(&self) -> &GazeHealth {
        &self.health
    }

    pub fn smoother(&self) -> &GazeSmoother {
        &self.smoother
    }

    /// Most recent stabilized point.
    pub fn last_point(&self) -> Option<StabilizedPoint> {
        self.last_point
    }

    /// Drop filter state; health counters are kept.
    pub fn reset_filter(&mut self) {
        self.smoother.reset();
        self.last_point = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_snap_picks_nearest_within_radius() {
        let centers = [Point::new(100.0, 100.0), Point::new(160.0, 100.0)];
        let p = snap_to_nearest(Point::new(140.0, 100.0), centers, 150.0);
        assert_eq!(p, Point::new(160.0, 100.0));
    }

    #[test]
    fn test_snap_outside_radius_keeps_point() {
        let centers = [Point::new(0.0, 0.0)];
        let p = snap_to_nearest(Point::new(150.0, 0.0), centers, 150.0);
        assert_eq!(p, Point::new(150.0, 0.0));
    }

    #[test]
    fn test_null_sample_ignored() {
        let mut gp = GazeProcessor::new(GazeConfig::default());
        let t0 = Instant::now();
        gp.process(Some(RawGazeSample::new(300.0, 300.0, t0)), &[]);
        assert!(gp.process(None, &[]).is_none());
        assert_eq!(gp.last_point(), Some(Point::new(300.0, 300.0)));
        assert_eq!(gp.health().absent_samples, 1);

        // The absent sample must not drag the filter toward the origin.
        let p = gp
            .process(
                Some(RawGazeSample::new(300.0, 300.0, t0 + Duration::from_millis(66))),
                &[],
            )
            .unwrap();
        assert!(p.distance(Point::new(300.0, 300.0)) < 1e-9);
    }

    #[test]
    fn test_snapping_applies_and_can_be_suppressed() {
        let mut gp = GazeProcessor::new(GazeConfig::default());
        let target = [Point::new(400.0, 300.0)];
        let t0 = Instant::now();

        let p = gp
            .process(Some(RawGazeSample::new(350.0, 280.0, t0)), &target)
            .unwrap();
        assert_eq!(p, Point::new(400.0, 300.0));

        gp.set_snapping_suppressed(true);
        gp.reset_filter();
        let p = gp
            .process(
                Some(RawGazeSample::new(350.0, 280.0, t0 + Duration::from_millis(33))),
                &target,
            )
            .unwrap();
        assert_eq!(p, Point::new(350.0, 280.0));
    }
}
