//! Tracking health for the gaze channel.
//!
//! Absent samples (no face in frame) are normal in short bursts; a long
//! run of them means the channel is effectively down and the UI should say
//! so passively rather than keep waiting for dwell activations.

use std::time::Instant;
use tracing::{info, warn};

/// Counters describing the recent quality of the gaze stream.
#[derive(Debug, Clone)]
pub struct GazeHealth {
    /// Consecutive absent samples.
    pub consecutive_lost: u32,
    /// Whether the lost run has crossed the threshold.
    pub tracking_lost: bool,
    /// Valid samples seen since start.
    pub valid_samples: u64,
    /// Absent samples seen since start.
    pub absent_samples: u64,
    /// Timestamp of the last valid sample.
    pub last_valid: Option<Instant>,
    lost_after: u32,
}

impl GazeHealth {
    pub fn new(lost_after: u32) -> Self {
        Self {
            consecutive_lost: 0,
            tracking_lost: false,
            valid_samples: 0,
            absent_samples: 0,
            last_valid: None,
            lost_after: lost_after.max(1),
        }
    }

    pub fn record_valid(&mut self, at: Instant) {
        if self.tracking_lost {
            info!(
                "Gaze tracking recovered after {} absent samples",
                self.consecutive_lost
            );
        }
        self.consecutive_lost = 0;
        self.tracking_lost = false;
        self.valid_samples += 1;
        self.last_valid = Some(at);
    }

    pub fn record_absent(&mut self) {
        self.absent_samples += 1;
        self.consecutive_lost = self.consecutive_lost.saturating_add(1);
        if !self.tracking_lost && self.consecutive_lost >= self.lost_after {
            self.tracking_lost = true;
            warn!(
                "Gaze tracking lost ({} consecutive absent samples)",
                self.consecutive_lost
            );
        }
    }
}
