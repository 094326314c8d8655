//! Dwell activation: select a control by holding gaze on it.
//!
//! Each `DwellTarget` is a small state machine `Idle → Gazing → Activated`.
//! Leaving the padded region before the threshold drops back to `Idle`;
//! reaching it activates exactly once, and the target stays activated
//! until `reset()`. There is no timer object to leak: the only deadline a
//! target has is derived from its phase, so resetting or leaving the region
//! cancels it by construction.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::geometry::{Point, Rect};

// ── Config ──────────────────────────────────────────────────

/// Defaults applied to targets that do not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// Dwell threshold for ordinary buttons.
    pub default_dwell_ms: u64,
    /// Hit-test margin around the element rect.
    pub default_padding_px: f64,
    /// A timer-driven activation requires an in-region sample this recent;
    /// otherwise the activation waits for the next sample.
    pub max_sample_gap_ms: u64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            default_dwell_ms: 1500,
            default_padding_px: 60.0,
            max_sample_gap_ms: 300,
        }
    }
}

/// Named dwell durations used across screens. Destructive actions sit at
/// the long end so a passing glance cannot trigger them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DwellPreset {
    /// Close, back, previous/next within a flow.
    Quick,
    /// Navigation and ordinary buttons.
    Standard,
    /// Picking an item out of a list.
    Selection,
    /// Delete, confirm-delete, calibration skip.
    Destructive,
}

impl DwellPreset {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(match self {
            Self::Quick => 1200,
            Self::Standard => 1500,
            Self::Selection => 1800,
            Self::Destructive => 2000,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Selection => "selection",
            Self::Destructive => "destructive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(Self::Quick),
            "standard" => Some(Self::Standard),
            "selection" => Some(Self::Selection),
            "destructive" => Some(Self::Destructive),
            _ => None,
        }
    }
}

// ── Phase ───────────────────────────────────────────────────

/// Where a target is in its dwell cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellPhase {
    Idle,
    Gazing { since: Instant, last_seen: Instant },
    Activated { at: Instant },
}

/// Emitted once when a target's dwell threshold is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation<A> {
    pub target_id: String,
    pub action: A,
    pub at: Instant,
}

// ── Target ──────────────────────────────────────────────────

/// One dwell-activatable element.
#[derive(Debug, Clone)]
pub struct DwellTarget<A> {
    pub id: String,
    pub rect: Rect,
    pub padding: f64,
    pub dwell: Duration,
    pub action: A,
    max_sample_gap: Duration,
    phase: DwellPhase,
}

impl<A: Clone> DwellTarget<A> {
    pub fn new(id: impl Into<String>, rect: Rect, dwell: Duration, action: A) -> Self {
        let defaults = DwellConfig::default();
        Self {
            id: id.into(),
            rect,
            padding: defaults.default_padding_px,
            dwell,
            action,
            max_sample_gap: Duration::from_millis(defaults.max_sample_gap_ms),
            phase: DwellPhase::Idle,
        }
    }

    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_max_sample_gap(mut self, gap: Duration) -> Self {
        self.max_sample_gap = gap;
        self
    }

    pub fn phase(&self) -> DwellPhase {
        self.phase
    }

    pub fn is_gazing(&self) -> bool {
        matches!(self.phase, DwellPhase::Gazing { .. })
    }

    pub fn is_activated(&self) -> bool {
        matches!(self.phase, DwellPhase::Activated { .. })
    }

    /// Padded hit test.
    pub fn hit(&self, point: Point) -> bool {
        self.rect.padded(self.padding).contains(point)
    }

    /// Feed a stabilized point.
    pub fn update(&mut self, point: Point, now: Instant) -> Option<Activation<A>> {
        if self.is_activated() {
            return None;
        }

        if !self.hit(point) {
            if self.is_gazing() {
                debug!(id = %self.id, "Dwell interrupted");
            }
            self.phase = DwellPhase::Idle;
            return None;
        }

        let since = match self.phase {
            DwellPhase::Gazing { since, last_seen }
                if now.saturating_duration_since(last_seen) <= self.max_sample_gap =>
            {
                since
            }
            DwellPhase::Gazing { last_seen, .. } => {
                debug!(
                    id = %self.id,
                    gap_ms = now.saturating_duration_since(last_seen).as_millis() as u64,
                    "Dwell restarted after sample gap"
                );
                now
            }
            _ => {
                debug!(id = %self.id, "Dwell started");
                now
            }
        };
        self.phase = DwellPhase::Gazing {
            since,
            last_seen: now,
        };

        if now.saturating_duration_since(since) >= self.dwell {
            return Some(self.activate(now));
        }
        None
    }

    /// Fire a pending activation whose threshold passed between samples.
    pub fn tick(&mut self, now: Instant) -> Option<Activation<A>> {
        if let DwellPhase::Gazing { since, last_seen } = self.phase {
            if now.saturating_duration_since(since) >= self.dwell
                && now.saturating_duration_since(last_seen) <= self.max_sample_gap
            {
                return Some(self.activate(now));
            }
        }
        None
    }

    fn activate(&mut self, now: Instant) -> Activation<A> {
        self.phase = DwellPhase::Activated { at: now };
        info!(id = %self.id, dwell_ms = self.dwell.as_millis() as u64, "Dwell activated");
        Activation {
            target_id: self.id.clone(),
            action: self.action.clone(),
            at: now,
        }
    }

    /// Fill fraction for the visual indicator, 0.0..=1.0.
    pub fn progress(&self, now: Instant) -> f64 {
        match self.phase {
            DwellPhase::Idle => 0.0,
            DwellPhase::Activated { .. } => 1.0,
            DwellPhase::Gazing { since, .. } => {
                if self.dwell.is_zero() {
                    return 1.0;
                }
                let elapsed = now.saturating_duration_since(since).as_secs_f64();
                (elapsed / self.dwell.as_secs_f64()).min(1.0)
            }
        }
    }

    /// When `tick` would activate this target if no further sample
    /// arrives. `None` while idle, activated, or when the last sample will
    /// be too stale by then; activation then waits for the next sample.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            DwellPhase::Gazing { since, last_seen } => {
                let at = since + self.dwell;
                (at <= last_seen + self.max_sample_gap).then_some(at)
            }
            _ => None,
        }
    }

    /// Re-arm: clear activation, gazing state, and progress.
    pub fn reset(&mut self) {
        self.phase = DwellPhase::Idle;
    }
}

// ── Set ─────────────────────────────────────────────────────

/// The dwell targets of one screen, replaced wholesale on navigation.
#[derive(Debug, Clone)]
pub struct DwellSet<A> {
    targets: Vec<DwellTarget<A>>,
}

impl<A> Default for DwellSet<A> {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
        }
    }
}

impl<A: Clone> DwellSet<A> {
    pub fn new(targets: Vec<DwellTarget<A>>) -> Self {
        Self { targets }
    }

    pub fn push(&mut self, target: DwellTarget<A>) {
        self.targets.push(target);
    }

    pub fn update_all(&mut self, point: Point, now: Instant) -> Vec<Activation<A>> {
        self.targets
            .iter_mut()
            .filter_map(|t| t.update(point, now))
            .collect()
    }

    pub fn tick_all(&mut self, now: Instant) -> Vec<Activation<A>> {
        self.targets.iter_mut().filter_map(|t| t.tick(now)).collect()
    }

    pub fn reset_all(&mut self) {
        for t in &mut self.targets {
            t.reset();
        }
    }

    /// Reset every target matching `pred`; returns how many were reset.
    pub fn reset_where(&mut self, pred: impl Fn(&DwellTarget<A>) -> bool) -> usize {
        let mut count = 0;
        for t in &mut self.targets {
            if pred(t) {
                t.reset();
                count += 1;
            }
        }
        count
    }

    pub fn reset(&mut self, id: &str) -> bool {
        match self.targets.iter_mut().find(|t| t.id == id) {
            Some(t) => {
                t.reset();
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.targets.iter().filter_map(|t| t.deadline()).min()
    }

    /// Centers of every target, for snapping.
    pub fn centers(&self) -> Vec<Point> {
        self.targets.iter().map(|t| t.rect.center()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&DwellTarget<A>> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DwellTarget<A>> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    fn target() -> DwellTarget<&'static str> {
        DwellTarget::new(
            "home",
            Rect::new(100.0, 100.0, 200.0, 150.0),
            Duration::from_millis(1500),
            "go-home",
        )
        .with_padding(50.0)
    }

    /// Feed `p` every 33ms from `from` to `to` inclusive of `from`.
    fn hold(
        t: &mut DwellTarget<&'static str>,
        t0: Instant,
        p: Point,
        from: u64,
        to: u64,
    ) -> Vec<Activation<&'static str>> {
        let mut fired = Vec::new();
        let mut at = from;
        while at <= to {
            fired.extend(t.update(p, ms(t0, at)));
            at += 33;
        }
        fired
    }

    #[test]
    fn test_held_past_threshold_activates_once() {
        let t0 = Instant::now();
        let mut t = target();
        let fired = hold(&mut t, t0, Point::new(150.0, 125.0), 0, 1600);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].action, "go-home");
        assert!(fired[0].at >= ms(t0, 1500));
        assert!(t.is_activated());
    }

    #[test]
    fn test_leaving_early_never_activates() {
        let t0 = Instant::now();
        let mut t = target();
        let fired = hold(&mut t, t0, Point::new(150.0, 125.0), 0, 1000);
        assert!(fired.is_empty());
        assert!(t.update(Point::new(600.0, 600.0), ms(t0, 1033)).is_none());
        assert_eq!(t.phase(), DwellPhase::Idle);
        assert!(t.tick(ms(t0, 5000)).is_none());
    }

    #[test]
    fn test_padding_extends_hit_region() {
        let t = target();
        assert!(t.hit(Point::new(60.0, 60.0)));
        assert!(!t.hit(Point::new(40.0, 60.0)));
    }

    #[test]
    fn test_reentry_restarts_timer() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        hold(&mut t, t0, inside, 0, 1200);
        t.update(Point::new(900.0, 900.0), ms(t0, 1250));
        let fired = hold(&mut t, t0, inside, 1300, 2700);
        assert!(fired.is_empty(), "only 1400ms of continuous presence");
        let fired = hold(&mut t, t0, inside, 2800, 2900);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_activated_is_monotonic_until_reset() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        hold(&mut t, t0, inside, 0, 1600);
        assert!(t.is_activated());

        // Leaving and returning does not re-arm.
        t.update(Point::new(900.0, 900.0), ms(t0, 1700));
        assert!(t.is_activated());
        assert!(hold(&mut t, t0, inside, 1800, 4000).is_empty());

        t.reset();
        assert_eq!(t.progress(ms(t0, 4000)), 0.0);
        let fired = hold(&mut t, t0, inside, 5000, 6600);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_progress_fills() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        t.update(inside, t0);
        assert!((t.progress(ms(t0, 750)) - 0.5).abs() < 1e-9);
        assert_eq!(t.progress(ms(t0, 9000)), 1.0);
    }

    #[test]
    fn test_tick_fires_between_samples() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        assert!(hold(&mut t, t0, inside, 0, 1400).is_empty());
        assert_eq!(t.deadline(), Some(ms(t0, 1500)));
        assert!(t.tick(ms(t0, 1499)).is_none());
        let fired = t.tick(ms(t0, 1500));
        assert!(fired.is_some());
        assert!(t.tick(ms(t0, 1600)).is_none());
    }

    #[test]
    fn test_tick_waits_when_samples_went_stale() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        t.update(inside, t0);
        // Last sample at 0ms; by 1500ms it is far too old to trust.
        assert!(t.deadline().is_none());
        assert!(t.tick(ms(t0, 1500)).is_none());
        assert!(t.is_gazing());
        // The returning sample starts a fresh dwell instead of firing.
        assert!(t.update(inside, ms(t0, 1550)).is_none());
        assert!(t.progress(ms(t0, 1550)) < 0.01);
        for step in 1..15 {
            assert!(t.update(inside, ms(t0, 1550 + step * 100)).is_none());
        }
        assert!(t.update(inside, ms(t0, 3050)).is_some());
    }

    #[test]
    fn test_sample_gap_restarts_dwell() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        for step in 0..10 {
            assert!(t.update(inside, ms(t0, step * 100)).is_none());
        }
        // 900ms in, then 400ms with nothing inside the region.
        assert!(t.update(inside, ms(t0, 1300)).is_none());
        assert!(t.is_gazing());
        assert!(t.progress(ms(t0, 1300)) < 0.01);
        for step in 1..15 {
            assert!(t.update(inside, ms(t0, 1300 + step * 100)).is_none());
        }
        assert!(t.update(inside, ms(t0, 2800)).is_some());
    }

    #[test]
    fn test_gap_within_limit_keeps_dwell() {
        let t0 = Instant::now();
        let mut t = target();
        let inside = Point::new(150.0, 125.0);
        t.update(inside, t0);
        t.update(inside, ms(t0, 300));
        t.update(inside, ms(t0, 600));
        t.update(inside, ms(t0, 900));
        t.update(inside, ms(t0, 1200));
        assert!(t.update(inside, ms(t0, 1500)).is_some());
    }

    #[test]
    fn test_set_replaced_and_reset() {
        let t0 = Instant::now();
        let mut set = DwellSet::new(vec![
            target(),
            DwellTarget::new(
                "delete",
                Rect::new(500.0, 500.0, 600.0, 550.0),
                DwellPreset::Destructive.duration(),
                "delete",
            ),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.centers()[1], Point::new(550.0, 525.0));

        set.update_all(Point::new(550.0, 525.0), t0);
        assert!(set.next_deadline().is_none(), "last sample too old by 2000ms");
        for step in 1..=18 {
            assert!(set
                .update_all(Point::new(550.0, 525.0), ms(t0, step * 100))
                .is_empty());
        }
        assert_eq!(set.next_deadline(), Some(ms(t0, 2000)));

        set.reset_all();
        assert!(set.next_deadline().is_none());
        assert!(set.reset("delete"));
        assert!(!set.reset("missing"));
    }

    #[test]
    fn test_preset_roundtrip() {
        for p in [
            DwellPreset::Quick,
            DwellPreset::Standard,
            DwellPreset::Selection,
            DwellPreset::Destructive,
        ] {
            assert_eq!(DwellPreset::from_str(p.as_str()), Some(p));
        }
        assert_eq!(DwellPreset::Quick.duration(), Duration::from_millis(1200));
    }
}
