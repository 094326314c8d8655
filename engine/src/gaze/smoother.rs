//! Velocity-adaptive exponential smoothing with median outlier rejection.

use std::collections::VecDeque;
use std::time::Instant;
use tracing::trace;

use super::{GazeConfig, RawGazeSample, StabilizedPoint};
use crate::geometry::Point;

/// Adaptive EMA filter over raw gaze samples.
///
/// Fast eye movement raises the smoothing factor so the output keeps up;
/// near fixation the factor drops to its floor and jitter is damped.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    alpha_min: f64,
    alpha_max: f64,
    alpha_gain: f64,
    outlier_threshold_px: f64,
    outlier_min_history: usize,
    history_size: usize,

    smoothed: Option<Point>,
    last_raw: Option<Point>,
    last_time: Option<Instant>,
    history: VecDeque<Point>,
    last_alpha: f64,
    rejected: u64,
}

impl GazeSmoother {
    pub fn new(config: &GazeConfig) -> Self {
        Self {
            alpha_min: config.alpha_min,
            alpha_max: config.alpha_max,
            alpha_gain: config.alpha_gain,
            outlier_threshold_px: config.outlier_threshold_px,
            outlier_min_history: config.outlier_min_history,
            history_size: config.history_size.max(1),
            smoothed: None,
            last_raw: None,
            last_time: None,
            history: VecDeque::with_capacity(config.history_size.max(1)),
            last_alpha: config.alpha_min,
            rejected: 0,
        }
    }

    /// Feed one raw sample and return the stabilized point.
    ///
    /// Samples must arrive in emission order: each call starts from the
    /// previous call's smoothed state.
    pub fn update(&mut self, sample: RawGazeSample) -> StabilizedPoint {
        let raw = sample.point();

        let dt_ms = match self.last_time {
            Some(t) => (sample.timestamp.saturating_duration_since(t).as_secs_f64() * 1000.0)
                .max(1.0),
            None => 1.0,
        };
        let speed = match self.last_raw {
            Some(last) => {
                let vx = (raw.x - last.x).abs() / dt_ms;
                let vy = (raw.y - last.y).abs() / dt_ms;
                (vx * vx + vy * vy).sqrt()
            }
            None => 0.0,
        };
        let alpha = (speed * self.alpha_gain).clamp(self.alpha_min, self.alpha_max);
        self.last_alpha = alpha;

        self.history.push_back(raw);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
        self.last_raw = Some(raw);
        self.last_time = Some(sample.timestamp);

        let prev = match self.smoothed {
            Some(prev) => prev,
            None => {
                self.smoothed = Some(raw);
                return raw;
            }
        };

        if self.is_outlier(raw) {
            self.rejected += 1;
            trace!(x = raw.x, y = raw.y, "gaze outlier rejected");
            return prev;
        }

        let next = Point::new(
            alpha * raw.x + (1.0 - alpha) * prev.x,
            alpha * raw.y + (1.0 - alpha) * prev.y,
        );
        self.smoothed = Some(next);
        next
    }

    fn is_outlier(&self, raw: Point) -> bool {
        if self.history.len() < self.outlier_min_history {
            return false;
        }
        let median = Point::new(
            median(self.history.iter().map(|p| p.x)),
            median(self.history.iter().map(|p| p.y)),
        );
        raw.distance(median) > self.outlier_threshold_px
    }

    /// Last smoothed point, if any sample has been seen.
    pub fn current(&self) -> Option<StabilizedPoint> {
        self.smoothed
    }

    /// Smoothing factor applied to the most recent sample.
    pub fn last_alpha(&self) -> f64 {
        self.last_alpha
    }

    /// Number of samples rejected as outliers since the last reset.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Forget all state (e.g. after recalibration changes the estimator).
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.last_raw = None;
        self.last_time = None;
        self.history.clear();
        self.last_alpha = self.alpha_min;
        self.rejected = 0;
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.collect();
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let m = v.len() / 2;
    if v.len() % 2 == 1 {
        v[m]
    } else {
        (v[m - 1] + v[m]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(t0: Instant, ms: u64, x: f64, y: f64) -> RawGazeSample {
        RawGazeSample::new(x, y, t0 + Duration::from_millis(ms))
    }

    #[test]
    fn test_first_sample_passes_through() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let p = s.update(at(Instant::now(), 0, 320.0, 240.0));
        assert_eq!(p, Point::new(320.0, 240.0));
    }

    #[test]
    fn test_fixation_uses_alpha_floor() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 100.0, 100.0));
        // 1px over 100ms is 0.01 px/ms: far below the floor.
        let p = s.update(at(t0, 100, 101.0, 100.0));
        assert!((s.last_alpha() - 0.1).abs() < 1e-9);
        assert!((p.x - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_fast_movement_uses_alpha_ceiling() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 100.0, 100.0));
        let p = s.update(at(t0, 10, 180.0, 100.0));
        assert!((s.last_alpha() - 0.6).abs() < 1e-9);
        assert!((p.x - 148.0).abs() < 1e-9);
    }

    #[test]
    fn test_intermediate_speed_scales_alpha() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 0.0, 0.0));
        // 15px over 100ms = 0.15 px/ms → alpha 0.3
        s.update(at(t0, 100, 15.0, 0.0));
        assert!((s.last_alpha() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_clamped_to_one_ms() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 0.0, 0.0));
        s.update(at(t0, 0, 0.1, 0.0));
        // 0.1px / 1ms * 2 = 0.2
        assert!((s.last_alpha() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_spike_rejected_after_window_fills() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        let mut last = Point::ORIGIN;
        for i in 0..10 {
            let jitter = if i % 2 == 0 { 2.0 } else { -2.0 };
            last = s.update(at(t0, i * 33, 500.0 + jitter, 400.0 - jitter));
        }
        let spiked = s.update(at(t0, 330, 750.0, 400.0));
        assert_eq!(spiked, last);
        assert_eq!(s.rejected_count(), 1);
        assert_eq!(s.history_len(), 11);
    }

    #[test]
    fn test_no_rejection_before_min_history() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 500.0, 400.0));
        s.update(at(t0, 33, 500.0, 400.0));
        let p = s.update(at(t0, 66, 900.0, 400.0));
        assert!(p.x > 500.0);
        assert_eq!(s.rejected_count(), 0);
    }

    #[test]
    fn test_history_bounded() {
        let config = GazeConfig::default();
        let mut s = GazeSmoother::new(&config);
        let t0 = Instant::now();
        for i in 0..40 {
            s.update(at(t0, i * 20, 10.0, 10.0));
        }
        assert_eq!(s.history_len(), config.history_size);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = GazeSmoother::new(&GazeConfig::default());
        let t0 = Instant::now();
        s.update(at(t0, 0, 10.0, 10.0));
        s.reset();
        assert!(s.current().is_none());
        assert_eq!(s.history_len(), 0);
        let p = s.update(at(t0, 50, 700.0, 700.0));
        assert_eq!(p, Point::new(700.0, 700.0));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median([3.0, 1.0, 2.0].into_iter()), 2.0);
        assert_eq!(median([4.0, 1.0, 3.0, 2.0].into_iter()), 2.5);
        assert_eq!(median(std::iter::empty()), 0.0);
    }
}
