//! Engine configuration, loaded from JSON with per-field defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::calibration::CalibrationConfig;
use crate::dwell::DwellConfig;
use crate::error::{EngineError, Result};
use crate::gaze::GazeConfig;
use crate::geometry::Viewport;
use crate::tour::TourConfig;
use crate::voice::VoiceConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run calibration at startup when the user has not calibrated.
    pub auto_calibrate: bool,
    pub viewport: Viewport,
    pub gaze: GazeConfig,
    pub dwell: DwellConfig,
    pub calibration: CalibrationConfig,
    pub tour: TourConfig,
    pub voice: VoiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_calibrate: true,
            viewport: Viewport::default(),
            gaze: GazeConfig::default(),
            dwell: DwellConfig::default(),
            calibration: CalibrationConfig::default(),
            tour: TourConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|source| EngineError::Json {
            what: "engine config".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file. Keys left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Store {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f64) -> Result<()> {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(EngineError::Config(format!("{} must be positive, got {}", name, v)))
            }
        }
        fn nonzero(name: &str, v: u64) -> Result<()> {
            if v > 0 {
                Ok(())
            } else {
                Err(EngineError::Config(format!("{} must be non-zero", name)))
            }
        }

        positive("viewport.width", self.viewport.width)?;
        positive("viewport.height", self.viewport.height)?;

        let g = &self.gaze;
        positive("gaze.snap_radius_px", g.snap_radius_px)?;
        positive("gaze.outlier_threshold_px", g.outlier_threshold_px)?;
        positive("gaze.alpha_gain", g.alpha_gain)?;
        if g.history_size == 0 {
            return Err(EngineError::Config("gaze.history_size must be non-zero".into()));
        }
        if g.outlier_min_history > g.history_size {
            return Err(EngineError::Config(format!(
                "gaze.outlier_min_history ({}) exceeds history_size ({})",
                g.outlier_min_history, g.history_size
            )));
        }
        if !(0.0 < g.alpha_min && g.alpha_min <= g.alpha_max && g.alpha_max <= 1.0) {
            return Err(EngineError::Config(format!(
                "gaze alpha bounds out of order: {}..{}",
                g.alpha_min, g.alpha_max
            )));
        }

        nonzero("dwell.default_dwell_ms", self.dwell.default_dwell_ms)?;

        let c = &self.calibration;
        if c.points.is_empty() {
            return Err(EngineError::Config("calibration.points is empty".into()));
        }
        if c.dot_sizes_px.is_empty() {
            return Err(EngineError::Config(
                "calibration.dot_sizes_px needs one size per round".into(),
            ));
        }
        for (i, d) in c.dot_sizes_px.iter().enumerate() {
            positive(&format!("calibration.dot_sizes_px[{}]", i), *d)?;
        }
        for p in &c.points {
            if !(0.0..=100.0).contains(&p.x) || !(0.0..=100.0).contains(&p.y) {
                return Err(EngineError::Config(format!(
                    "calibration point ({}, {}) is outside 0-100%",
                    p.x, p.y
                )));
            }
        }
        nonzero("calibration.point_dwell_ms", c.point_dwell_ms)?;
        positive("calibration.samples_per_second", c.samples_per_second)?;
        nonzero("calibration.skip_dwell_ms", c.skip_dwell_ms)?;

        for (i, s) in self.tour.steps.iter().enumerate() {
            nonzero(&format!("tour.steps[{}].duration_ms", i), s.duration_ms)?;
        }

        nonzero("voice.silence_timeout_ms", self.voice.silence_timeout_ms)?;
        Ok(())
    }
}
