//! One-time guided tour shown after a user's first calibration.
//!
//! Steps auto-advance on a timer; the user can also move on with "next" or
//! end the tour with "skip". Either way the engine records the tour as
//! completed so it never runs again unless persisted state is reset.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::scheduler::Scheduler;

/// One screen of the tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourStep {
    pub title: String,
    pub body: String,
    pub duration_ms: u64,
}

impl TourStep {
    pub fn new(title: &str, body: &str, duration_ms: u64) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    pub steps: Vec<TourStep>,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                TourStep::new(
                    "Look to select",
                    "Hold your gaze on any button until its ring fills to press it.",
                    6000,
                ),
                TourStep::new(
                    "Speak to navigate",
                    "Say \"EyeQ home\", \"EyeQ flashcards\" or \"EyeQ quiz\" at any time.",
                    6000,
                ),
                TourStep::new(
                    "Dictate answers",
                    "Look at a text box to start dictating. Pause or say \"EyeQ done\" to finish.",
                    7000,
                ),
                TourStep::new(
                    "Recalibrate anytime",
                    "If the pointer drifts, say \"EyeQ recalibrate\".",
                    5000,
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourStatus {
    Inactive,
    Showing { step: usize },
    Finished,
    Skipped,
}

impl TourStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Showing { .. } => "showing",
            Self::Finished => "finished",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TourEvent {
    StepShown { index: usize, total: usize, title: String },
    Finished,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Advance;

/// Tour sequencer. Owns the auto-advance timer.
#[derive(Debug)]
pub struct Tour {
    config: TourConfig,
    status: TourStatus,
    scheduler: Scheduler<Advance>,
}

impl Tour {
    pub fn new(config: TourConfig) -> Self {
        Self {
            config,
            status: TourStatus::Inactive,
            scheduler: Scheduler::new(),
        }
    }

    pub fn start(&mut self, now: Instant) -> Vec<TourEvent> {
        info!("Tour started ({} steps)", self.config.steps.len());
        self.show(0, now)
    }

    fn show(&mut self, index: usize, now: Instant) -> Vec<TourEvent> {
        self.scheduler.cancel_all();
        let Some(step) = self.config.steps.get(index) else {
            self.status = TourStatus::Finished;
            info!("Tour finished");
            return vec![TourEvent::Finished];
        };
        self.status = TourStatus::Showing { step: index };
        self.scheduler
            .schedule_in(now, Duration::from_millis(step.duration_ms), Advance);
        debug!("Tour step {}: {}", index + 1, step.title);
        vec![TourEvent::StepShown {
            index,
            total: self.config.steps.len(),
            title: step.title.clone(),
        }]
    }

    /// Move to the next step immediately.
    pub fn next(&mut self, now: Instant) -> Vec<TourEvent> {
        match self.status {
            TourStatus::Showing { step } => self.show(step + 1, now),
            _ => Vec::new(),
        }
    }

    pub fn skip(&mut self) -> Vec<TourEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        self.scheduler.cancel_all();
        self.status = TourStatus::Skipped;
        info!("Tour skipped");
        vec![TourEvent::Skipped]
    }

    /// Stop without reporting completion.
    pub fn cancel(&mut self) {
        self.scheduler.cancel_all();
        self.status = TourStatus::Inactive;
    }

    pub fn tick(&mut self, now: Instant) -> Vec<TourEvent> {
        let mut events = Vec::new();
        while let Some((at, Advance)) = self.scheduler.pop_next_due(now) {
            events.extend(self.next(at));
        }
        events
    }

    pub fn status(&self) -> TourStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TourStatus::Showing { .. })
    }

    pub fn current_step(&self) -> Option<&TourStep> {
        match self.status {
            TourStatus::Showing { step } => self.config.steps.get(step),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_tour() -> Tour {
        Tour::new(TourConfig {
            steps: vec![
                TourStep::new("a", "", 1000),
                TourStep::new("b", "", 1000),
            ],
        })
    }

    #[test]
    fn test_auto_advance_to_finish() {
        let t0 = Instant::now();
        let mut tour = short_tour();
        let ev = tour.start(t0);
        assert!(matches!(ev[0], TourEvent::StepShown { index: 0, total: 2, .. }));
        assert!(tour.tick(t0 + Duration::from_millis(999)).is_empty());

        let ev = tour.tick(t0 + Duration::from_millis(2500));
        assert_eq!(ev.len(), 2);
        assert_eq!(ev[1], TourEvent::Finished);
        assert_eq!(tour.status(), TourStatus::Finished);
        assert!(tour.next_deadline().is_none());
    }

    #[test]
    fn test_next_restarts_step_timer() {
        let t0 = Instant::now();
        let mut tour = short_tour();
        tour.start(t0);
        tour.next(t0 + Duration::from_millis(900));
        assert_eq!(tour.current_step().map(|s| s.title.as_str()), Some("b"));
        assert_eq!(tour.next_deadline(), Some(t0 + Duration::from_millis(1900)));
    }

    #[test]
    fn test_skip_cancels_timer() {
        let t0 = Instant::now();
        let mut tour = short_tour();
        tour.start(t0);
        assert_eq!(tour.skip(), vec![TourEvent::Skipped]);
        assert!(tour.tick(t0 + Duration::from_secs(10)).is_empty());
        assert!(tour.skip().is_empty());
    }

    #[test]
    fn test_empty_tour_finishes_immediately() {
        let mut tour = Tour::new(TourConfig { steps: vec![] });
        assert_eq!(tour.start(Instant::now()), vec![TourEvent::Finished]);
    }
}
