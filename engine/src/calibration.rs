//! Multi-round calibration protocol.
//!
//! The user looks at a sequence of dots while the protocol streams
//! (screen position, label) training pairs into the external estimator's
//! trainer. Each round visits every point once in a fresh random order
//! with a smaller dot than the last, so later rounds train with tighter
//! tolerance. No input is needed beyond looking; a dwell-activated skip
//! button ends the session early.
//!
//! ```text
//! Intro (first run) ─▶ Countdown ─▶ Presenting{r,i} ─▶ RoundBreak ─▶ Presenting{r+1,0}
//!                                         │                                │
//!                                         └────────── last point ──────────┴─▶ Finishing ─▶ Complete
//! any running phase ─▶ Skipped (skip) | Aborted (abort)
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::dwell::DwellTarget;
use crate::geometry::{PercentPoint, Point, Rect, Viewport};
use crate::scheduler::Scheduler;

// ── Trainer seam ────────────────────────────────────────────

/// The estimator's trainable regression.
pub trait GazeTrainer {
    /// Record that the user was looking at (`screen_x`, `screen_y`).
    fn record_sample(&mut self, screen_x: f64, screen_y: f64, label: &str) -> anyhow::Result<()>;
}

/// Trainer that discards samples, for running without an estimator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrainer;

impl GazeTrainer for NullTrainer {
    fn record_sample(&mut self, _: f64, _: f64, _: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Trainer that logs and counts samples, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTrainer {
    pub samples: u64,
}

impl GazeTrainer for LoggingTrainer {
    fn record_sample(&mut self, screen_x: f64, screen_y: f64, label: &str) -> anyhow::Result<()> {
        self.samples += 1;
        debug!(
            "Training sample #{} at ({:.0}, {:.0}) [{}]",
            self.samples, screen_x, screen_y, label
        );
        Ok(())
    }
}

// ── Config ──────────────────────────────────────────────────

/// Calibration layout and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Dot positions as viewport percentages.
    pub points: Vec<PercentPoint>,
    /// Dot diameter per round; its length is the number of rounds.
    pub dot_sizes_px: Vec<f64>,
    /// How long each dot stays on screen.
    pub point_dwell_ms: u64,
    /// Training samples submitted per second while a dot is shown.
    pub samples_per_second: f64,
    /// "Get ready" pause before the first round.
    pub countdown_ms: u64,
    /// Pause between rounds.
    pub round_break_ms: u64,
    /// How long the completion message stays up.
    pub finish_linger_ms: u64,
    /// Label passed with every training sample.
    pub sample_label: String,
    /// Skip button center, as viewport percentages.
    pub skip_center: PercentPoint,
    pub skip_width_px: f64,
    pub skip_height_px: f64,
    pub skip_padding_px: f64,
    pub skip_dwell_ms: u64,
}

/// 17 points weighted toward the center band. Extreme corners are left
/// out because webcam estimates are least reliable there.
pub fn default_points() -> Vec<PercentPoint> {
    vec![
        PercentPoint::new(20.0, 12.0),
        PercentPoint::new(50.0, 12.0),
        PercentPoint::new(80.0, 12.0),
        PercentPoint::new(10.0, 30.0),
        PercentPoint::new(35.0, 30.0),
        PercentPoint::new(65.0, 30.0),
        PercentPoint::new(90.0, 30.0),
        PercentPoint::new(10.0, 50.0),
        PercentPoint::new(25.0, 50.0),
        PercentPoint::new(50.0, 50.0),
        PercentPoint::new(75.0, 50.0),
        PercentPoint::new(90.0, 50.0),
        PercentPoint::new(10.0, 70.0),
        PercentPoint::new(35.0, 70.0),
        PercentPoint::new(65.0, 70.0),
        PercentPoint::new(90.0, 70.0),
        PercentPoint::new(50.0, 88.0),
    ]
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            points: default_points(),
            dot_sizes_px: vec![90.0, 60.0, 38.0],
            point_dwell_ms: 2500,
            samples_per_second: 12.0,
            countdown_ms: 2000,
            round_break_ms: 1500,
            finish_linger_ms: 1500,
            sample_label: "click".to_string(),
            skip_center: PercentPoint::new(94.0, 5.0),
            skip_width_px: 200.0,
            skip_height_px: 56.0,
            skip_padding_px: 40.0,
            skip_dwell_ms: 2000,
        }
    }
}

impl CalibrationConfig {
    pub fn rounds(&self) -> usize {
        self.dot_sizes_px.len()
    }

    /// Samples per dot, spread evenly across the dot's dwell window.
    pub fn samples_per_point(&self) -> usize {
        let n = (self.point_dwell_ms as f64 / 1000.0 * self.samples_per_second).round();
        n.max(1.0) as usize
    }

    pub fn total_presentations(&self) -> usize {
        self.points.len() * self.rounds()
    }
}

// ── Phase, session, events ──────────────────────────────────

/// Where the protocol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// Not started.
    Idle,
    /// First-run explanation, waiting for the user to continue.
    Intro,
    Countdown,
    Presenting { round: usize, point: usize },
    RoundBreak { completed_round: usize },
    /// All points done; completion message showing.
    Finishing,
    Complete,
    Skipped,
    Aborted,
}

impl CalibrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Intro => "intro",
            Self::Countdown => "countdown",
            Self::Presenting { .. } => "presenting",
            Self::RoundBreak { .. } => "round-break",
            Self::Finishing => "finishing",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }

    /// True from `start` until a terminal phase.
    pub fn is_running(&self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::Complete | Self::Skipped | Self::Aborted
        )
    }
}

/// The working state of one calibration run. Dropped on any terminal phase.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    pub round: usize,
    pub point_index: usize,
    /// This round's visiting order, as indexes into the configured points.
    pub order: Vec<usize>,
}

/// What the overlay should display.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundInfo {
    pub round: usize,
    pub total_rounds: usize,
    pub point: usize,
    pub total_points: usize,
    pub dot_diameter: f64,
}

impl RoundInfo {
    pub fn title(&self) -> String {
        format!("Round {} of {}", self.round + 1, self.total_rounds)
    }

    pub fn counter(&self) -> String {
        format!("Point {} / {}", self.point + 1, self.total_points)
    }
}

/// Transitions reported to the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    IntroShown,
    CountdownStarted,
    RoundStarted { round: usize, dot_diameter: f64 },
    PointShown { round: usize, index: usize, position: Point, dot_diameter: f64 },
    RoundComplete { round: usize },
    /// Every point presented; persist the calibrated flag now.
    Completed,
    /// Completion message dismissed; the overlay can close.
    Closed,
    /// Ended early by the user; persist the calibrated flag now.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Task {
    CountdownDone,
    Sample { x: f64, y: f64 },
    PointDone,
    BreakDone,
    LingerDone,
}

// ── Protocol ────────────────────────────────────────────────

/// Calibration state machine. Timers live in the owned scheduler and are
/// cleared on every phase change.
#[derive(Debug)]
pub struct CalibrationProtocol {
    config: CalibrationConfig,
    viewport: Viewport,
    rng: StdRng,
    phase: CalibrationPhase,
    session: Option<CalibrationSession>,
    scheduler: Scheduler<Task>,
    skip_target: DwellTarget<()>,
    presented: usize,
    samples_submitted: usize,
    samples_failed: usize,
}

impl CalibrationProtocol {
    pub fn new(config: CalibrationConfig, viewport: Viewport, rng: StdRng) -> Self {
        let center = viewport.resolve(config.skip_center);
        let skip_rect = Rect::from_origin_size(
            center.x - config.skip_width_px / 2.0,
            center.y - config.skip_height_px / 2.0,
            config.skip_width_px,
            config.skip_height_px,
        );
        let skip_target = DwellTarget::new(
            "calibration-skip",
            skip_rect,
            Duration::from_millis(config.skip_dwell_ms),
            (),
        )
        .with_padding(config.skip_padding_px);

        Self {
            config,
            viewport,
            rng,
            phase: CalibrationPhase::Idle,
            session: None,
            scheduler: Scheduler::new(),
            skip_target,
            presented: 0,
            samples_submitted: 0,
            samples_failed: 0,
        }
    }

    /// Begin a run. The intro is only shown on a user's first-ever run.
    pub fn start(&mut self, first_run: bool, now: Instant) -> Vec<CalibrationEvent> {
        self.scheduler.cancel_all();
        self.skip_target.reset();
        self.presented = 0;
        self.samples_submitted = 0;
        self.samples_failed = 0;
        self.session = Some(CalibrationSession {
            round: 0,
            point_index: 0,
            order: Vec::new(),
        });
        info!(
            "Calibration started: {} points x {} rounds{}",
            self.config.points.len(),
            self.config.rounds(),
            if first_run { " (with intro)" } else { "" }
        );

        if first_run {
            self.phase = CalibrationPhase::Intro;
            vec![CalibrationEvent::IntroShown]
        } else {
            self.begin_countdown(now)
        }
    }

    /// Leave the first-run intro.
    pub fn dismiss_intro(&mut self, now: Instant) -> Vec<CalibrationEvent> {
        if self.phase != CalibrationPhase::Intro {
            return Vec::new();
        }
        self.begin_countdown(now)
    }

    fn begin_countdown(&mut self, now: Instant) -> Vec<CalibrationEvent> {
        self.phase = CalibrationPhase::Countdown;
        self.scheduler.cancel_all();
        self.scheduler.schedule_in(
            now,
            Duration::from_millis(self.config.countdown_ms),
            Task::CountdownDone,
        );
        vec![CalibrationEvent::CountdownStarted]
    }

    /// Feed a stabilized point to the skip button.
    pub fn on_gaze(&mut self, point: Point, now: Instant) -> Vec<CalibrationEvent> {
        if !self.accepts_skip() {
            return Vec::new();
        }
        match self.skip_target.update(point, now) {
            Some(_) => self.skip(),
            None => Vec::new(),
        }
    }

    /// Run every timer due at `now`.
    pub fn tick(&mut self, now: Instant, trainer: &mut dyn GazeTrainer) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        if self.accepts_skip() && self.skip_target.tick(now).is_some() {
            return self.skip();
        }
        while let Some((at, task)) = self.scheduler.pop_next_due(now) {
            match task {
                Task::CountdownDone => events.extend(self.start_round(0, at)),
                Task::Sample { x, y } => {
                    match trainer.record_sample(x, y, &self.config.sample_label) {
                        Ok(()) => self.samples_submitted += 1,
                        Err(e) => {
                            self.samples_failed += 1;
                            warn!("Trainer rejected calibration sample: {:#}", e);
                        }
                    }
                }
                Task::PointDone => events.extend(self.advance_point(at)),
                Task::BreakDone => {
                    if let CalibrationPhase::RoundBreak { completed_round } = self.phase {
                        events.extend(self.start_round(completed_round + 1, at));
                    }
                }
                Task::LingerDone => {
                    self.phase = CalibrationPhase::Complete;
                    self.session = None;
                    self.scheduler.cancel_all();
                    events.push(CalibrationEvent::Closed);
                }
            }
        }
        events
    }

    fn start_round(&mut self, round: usize, at: Instant) -> Vec<CalibrationEvent> {
        let mut order: Vec<usize> = (0..self.config.points.len()).collect();
        order.shuffle(&mut self.rng);
        self.session = Some(CalibrationSession {
            round,
            point_index: 0,
            order,
        });
        let dot_diameter = self.dot_diameter(round);
        info!("Calibration round {} of {} (dot {}px)", round + 1, self.config.rounds(), dot_diameter);

        let mut events = vec![CalibrationEvent::RoundStarted {
            round,
            dot_diameter,
        }];
        events.extend(self.show_point(at));
        events
    }

    fn show_point(&mut self, at: Instant) -> Vec<CalibrationEvent> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let (round, index) = (session.round, session.point_index);
        let Some(&point_idx) = session.order.get(index) else {
            return Vec::new();
        };
        let position = self.viewport.resolve(self.config.points[point_idx]);
        let dot_diameter = self.dot_diameter(round);
        self.phase = CalibrationPhase::Presenting { round, point: index };
        self.presented += 1;

        // Samples first so a sample sharing the final deadline still runs
        // before the point is retired.
        let dwell = Duration::from_millis(self.config.point_dwell_ms);
        let n = self.config.samples_per_point();
        for k in 1..=n {
            let offset = dwell.mul_f64(k as f64 / n as f64);
            self.scheduler.schedule_at(
                at + offset,
                Task::Sample {
                    x: position.x,
                    y: position.y,
                },
            );
        }
        self.scheduler.schedule_at(at + dwell, Task::PointDone);

        debug!(
            "Calibration point {}/{} at ({:.0}, {:.0})",
            index + 1,
            self.config.points.len(),
            position.x,
            position.y
        );
        vec![CalibrationEvent::PointShown {
            round,
            index,
            position,
            dot_diameter,
        }]
    }

    fn advance_point(&mut self, at: Instant) -> Vec<CalibrationEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.point_index += 1;
        if session.point_index < session.order.len() {
            return self.show_point(at);
        }

        let round = session.round;
        let mut events = vec![CalibrationEvent::RoundComplete { round }];
        self.scheduler.cancel_all();
        if round + 1 < self.config.rounds() {
            self.phase = CalibrationPhase::RoundBreak {
                completed_round: round,
            };
            self.scheduler.schedule_in(
                at,
                Duration::from_millis(self.config.round_break_ms),
                Task::BreakDone,
            );
        } else {
            info!(
                "Calibration complete ({} presentations, {} samples)",
                self.presented, self.samples_submitted
            );
            self.phase = CalibrationPhase::Finishing;
            self.scheduler.schedule_in(
                at,
                Duration::from_millis(self.config.finish_linger_ms),
                Task::LingerDone,
            );
            events.push(CalibrationEvent::Completed);
        }
        events
    }

    fn accepts_skip(&self) -> bool {
        self.phase.is_running() && self.phase != CalibrationPhase::Finishing
    }

    /// End the run early. The caller still marks the app calibrated.
    pub fn skip(&mut self) -> Vec<CalibrationEvent> {
        if !self.accepts_skip() {
            return Vec::new();
        }
        info!(
            "Calibration skipped in {} after {} presentations",
            self.phase.as_str(),
            self.presented
        );
        self.scheduler.cancel_all();
        self.skip_target.reset();
        self.session = None;
        self.phase = CalibrationPhase::Skipped;
        vec![CalibrationEvent::Skipped]
    }

    /// Tear down without completing (recalibration restart, shutdown).
    pub fn abort(&mut self) {
        if self.phase.is_running() {
            debug!("Calibration aborted in {}", self.phase.as_str());
        }
        self.scheduler.cancel_all();
        self.skip_target.reset();
        self.session = None;
        self.phase = CalibrationPhase::Aborted;
    }

    fn dot_diameter(&self, round: usize) -> f64 {
        self.config
            .dot_sizes_px
            .get(round)
            .or(self.config.dot_sizes_px.last())
            .copied()
            .unwrap_or(40.0)
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn round_info(&self) -> Option<RoundInfo> {
        let session = self.session.as_ref()?;
        match self.phase {
            CalibrationPhase::Presenting { .. } => Some(RoundInfo {
                round: session.round,
                total_rounds: self.config.rounds(),
                point: session.point_index,
                total_points: self.config.points.len(),
                dot_diameter: self.dot_diameter(session.round),
            }),
            _ => None,
        }
    }

    /// Fraction of all presentations finished, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        let total = self.config.total_presentations();
        if total == 0 || self.phase == CalibrationPhase::Complete || self.phase == CalibrationPhase::Finishing {
            return 1.0;
        }
        match self.phase {
            CalibrationPhase::Presenting { round, point } => {
                (round * self.config.points.len() + point) as f64 / total as f64
            }
            CalibrationPhase::RoundBreak { completed_round } => {
                ((completed_round + 1) * self.config.points.len()) as f64 / total as f64
            }
            _ => 0.0,
        }
    }

    pub fn skip_progress(&self, now: Instant) -> f64 {
        self.skip_target.progress(now)
    }

    pub fn skip_rect(&self) -> Rect {
        self.skip_target.rect
    }

    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn samples_submitted(&self) -> usize {
        self.samples_submitted
    }

    pub fn samples_failed(&self) -> usize {
        self.samples_failed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let skip = if self.accepts_skip() {
            self.skip_target.deadline()
        } else {
            None
        };
        match (self.scheduler.next_deadline(), skip) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingTrainer {
        samples: Vec<(f64, f64)>,
        fail: bool,
    }

    impl GazeTrainer for RecordingTrainer {
        fn record_sample(&mut self, x: f64, y: f64, label: &str) -> anyhow::Result<()> {
            assert_eq!(label, "click");
            if self.fail {
                anyhow::bail!("regression not ready");
            }
            self.samples.push((x, y));
            Ok(())
        }
    }

    fn protocol(seed: u64) -> CalibrationProtocol {
        CalibrationProtocol::new(
            CalibrationConfig::default(),
            Viewport::new(1920.0, 1080.0),
            StdRng::seed_from_u64(seed),
        )
    }

    /// Drive the protocol with ticks every `step` ms until it stops running
    /// or `limit` ms pass.
    fn run(
        cal: &mut CalibrationProtocol,
        trainer: &mut RecordingTrainer,
        t0: Instant,
        step: u64,
        limit: u64,
    ) -> Vec<CalibrationEvent> {
        let mut events = Vec::new();
        let mut t = 0;
        while t <= limit && cal.is_running() {
            events.extend(cal.tick(t0 + Duration::from_millis(t), trainer));
            t += step;
        }
        events
    }

    #[test]
    fn test_defaults() {
        let c = CalibrationConfig::default();
        assert_eq!(c.points.len(), 17);
        assert_eq!(c.rounds(), 3);
        assert_eq!(c.samples_per_point(), 30);
        for p in &c.points {
            let corner = (p.x < 15.0 || p.x > 85.0) && (p.y < 15.0 || p.y > 85.0);
            assert!(!corner, "extreme corner point {:?}", p);
        }
    }

    #[test]
    fn test_intro_only_on_first_run() {
        let t0 = Instant::now();
        let mut cal = protocol(1);
        assert_eq!(cal.start(true, t0), vec![CalibrationEvent::IntroShown]);
        assert_eq!(cal.phase(), CalibrationPhase::Intro);
        assert!(cal.next_deadline().is_none());
        assert_eq!(cal.dismiss_intro(t0), vec![CalibrationEvent::CountdownStarted]);

        let mut cal = protocol(1);
        assert_eq!(cal.start(false, t0), vec![CalibrationEvent::CountdownStarted]);
        assert_eq!(cal.next_deadline(), Some(t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_full_run_presents_every_point_each_round() {
        let t0 = Instant::now();
        let mut cal = protocol(7);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        let events = run(&mut cal, &mut trainer, t0, 50, 200_000);

        let shown: Vec<(usize, usize, Point)> = events
            .iter()
            .filter_map(|e| match e {
                CalibrationEvent::PointShown {
                    round,
                    index,
                    position,
                    ..
                } => Some((*round, *index, *position)),
                _ => None,
            })
            .collect();
        assert_eq!(shown.len(), 17 * 3);
        assert_eq!(cal.presented(), 51);

        let vp = Viewport::new(1920.0, 1080.0);
        let expected: HashSet<(i64, i64)> = default_points()
            .into_iter()
            .map(|p| {
                let px = vp.resolve(p);
                (px.x as i64, px.y as i64)
            })
            .collect();
        for round in 0..3 {
            let in_round: Vec<(i64, i64)> = shown
                .iter()
                .filter(|(r, _, _)| *r == round)
                .map(|(_, _, p)| (p.x as i64, p.y as i64))
                .collect();
            assert_eq!(in_round.len(), 17);
            let unique: HashSet<_> = in_round.iter().copied().collect();
            assert_eq!(unique, expected, "round {} is not a permutation", round);
        }

        assert_eq!(trainer.samples.len(), 51 * 30);
        assert_eq!(cal.phase(), CalibrationPhase::Complete);
        assert!(events.contains(&CalibrationEvent::Completed));
        assert_eq!(events.last(), Some(&CalibrationEvent::Closed));
        assert!(cal.session().is_none());
    }

    #[test]
    fn test_dot_shrinks_each_round() {
        let t0 = Instant::now();
        let mut cal = protocol(3);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        let events = run(&mut cal, &mut trainer, t0, 100, 200_000);
        let sizes: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                CalibrationEvent::RoundStarted { dot_diameter, .. } => Some(*dot_diameter),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![90.0, 60.0, 38.0]);
    }

    #[test]
    fn test_late_tick_catches_up_without_drift() {
        let t0 = Instant::now();
        let mut cal = protocol(5);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        // One tick, long after countdown + two full points.
        let events = cal.tick(t0 + Duration::from_millis(2000 + 2500 * 2), &mut trainer);
        let shown = events
            .iter()
            .filter(|e| matches!(e, CalibrationEvent::PointShown { .. }))
            .count();
        assert_eq!(shown, 3);
        assert_eq!(trainer.samples.len(), 60);
        assert_eq!(cal.phase(), CalibrationPhase::Presenting { round: 0, point: 2 });
    }

    #[test]
    fn test_skip_cancels_timers() {
        let t0 = Instant::now();
        let mut cal = protocol(9);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        cal.tick(t0 + Duration::from_millis(3000), &mut trainer);
        let before = trainer.samples.len();

        assert_eq!(cal.skip(), vec![CalibrationEvent::Skipped]);
        assert_eq!(cal.phase(), CalibrationPhase::Skipped);
        assert!(cal.next_deadline().is_none());
        assert!(cal.tick(t0 + Duration::from_secs(60), &mut trainer).is_empty());
        assert_eq!(trainer.samples.len(), before);
        assert!(cal.skip().is_empty());
    }

    #[test]
    fn test_skip_by_dwell() {
        let t0 = Instant::now();
        let mut cal = protocol(2);
        cal.start(true, t0);
        let center = cal.skip_rect().center();
        let mut events = Vec::new();
        let mut t = 0;
        while t <= 2100 {
            events.extend(cal.on_gaze(center, t0 + Duration::from_millis(t)));
            t += 50;
        }
        assert_eq!(events, vec![CalibrationEvent::Skipped]);
    }

    #[test]
    fn test_skip_button_clear_of_points() {
        let cal = protocol(0);
        let vp = Viewport::new(1920.0, 1080.0);
        let padded = cal.skip_rect().padded(cal.config().skip_padding_px);
        for p in default_points() {
            assert!(!padded.contains(vp.resolve(p)), "{:?} under skip button", p);
        }
    }

    #[test]
    fn test_trainer_errors_do_not_stop_protocol() {
        let t0 = Instant::now();
        let mut cal = protocol(4);
        let mut trainer = RecordingTrainer {
            fail: true,
            ..Default::default()
        };
        cal.start(false, t0);
        cal.tick(t0 + Duration::from_millis(2000 + 2500), &mut trainer);
        assert_eq!(cal.samples_failed(), 30);
        assert_eq!(cal.phase(), CalibrationPhase::Presenting { round: 0, point: 1 });
    }

    #[test]
    fn test_abort_is_silent() {
        let t0 = Instant::now();
        let mut cal = protocol(4);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        cal.abort();
        assert_eq!(cal.phase(), CalibrationPhase::Aborted);
        assert!(cal.tick(t0 + Duration::from_secs(10), &mut trainer).is_empty());
        assert!(trainer.samples.is_empty());
    }

    #[test]
    fn test_progress_and_round_info() {
        let t0 = Instant::now();
        let mut cal = protocol(6);
        let mut trainer = RecordingTrainer::default();
        cal.start(false, t0);
        assert_eq!(cal.progress(), 0.0);
        cal.tick(t0 + Duration::from_millis(2000 + 2500), &mut trainer);
        let info = cal.round_info().unwrap();
        assert_eq!(info.title(), "Round 1 of 3");
        assert_eq!(info.counter(), "Point 2 / 17");
        assert!((cal.progress() - 1.0 / 51.0).abs() < 1e-9);
    }
}
