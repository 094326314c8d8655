//! The interaction engine: one owned object holding every piece of
//! process-wide interaction state.
//!
//! Gaze samples, speech events and timer ticks all enter here. The engine
//! routes them to the calibration overlay, the tour, the voice state
//! machine, or the visible screen's dwell targets, performs the resulting
//! UI actions through the `ActionSink`, and returns what happened as
//! `EngineEvent`s for the host to render.
//!
//! ```text
//! gaze ──▶ GazeProcessor ──▶ listeners
//!                        ├─▶ CalibrationProtocol (running)
//!                        └─▶ ScreenCoordinator   (calibrated, no overlay) ──▶ ActionSink
//! speech ─▶ VoiceEngine ──▶ commands / field text ─────────────────────────▶ ActionSink
//! ```

use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::calibration::{CalibrationEvent, CalibrationProtocol, GazeTrainer};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dwell::Activation;
use crate::gaze::{GazeProcessor, RawGazeSample, StabilizedPoint};
use crate::persist::{FlagStore, PersistedFlags, PersistedState};
use crate::screen::{ActionSink, ScreenCoordinator, ScreenLayout, ScreenTarget, UiAction};
use crate::tour::{Tour, TourEvent};
use crate::voice::{
    CommandAction, CommandTable, OnComplete, SpeechEvent, SpeechSource, VoiceEngine, VoiceEvent,
};

/// Receives every stabilized point. An error is logged and the listener
/// stays registered.
pub type GazeListener = Box<dyn FnMut(StabilizedPoint) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The external collaborators the engine drives.
pub struct Collaborators<S, T, F, A> {
    pub speech: S,
    pub trainer: T,
    pub store: F,
    pub sink: A,
}

/// Something the host may want to render or log.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Calibration(CalibrationEvent),
    Tour(TourEvent),
    Voice(VoiceEvent),
    /// A screen target's dwell completed.
    Dwell {
        screen: Option<String>,
        target: String,
    },
}

/// Snapshot for status lines and indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub calibrated: bool,
    pub tour_completed: bool,
    pub calibration: &'static str,
    pub tour: &'static str,
    pub voice_mode: &'static str,
    pub listening: &'static str,
    pub active_field: Option<String>,
    pub screen: Option<String>,
    pub tracking_lost: bool,
    pub valid_samples: u64,
    pub rejected_samples: u64,
    pub recognition_restarts: u64,
}

pub struct InteractionEngine<S, T, F, A>
where
    S: SpeechSource,
    T: GazeTrainer,
    F: FlagStore,
    A: ActionSink,
{
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    gaze: GazeProcessor,
    coordinator: ScreenCoordinator,
    calibration: CalibrationProtocol,
    tour: Tour,
    voice: VoiceEngine<S>,
    trainer: T,
    persisted: PersistedState<F>,
    sink: A,
    listeners: Vec<(ListenerId, GazeListener)>,
    next_listener: u64,
}

impl<S, T, F, A> InteractionEngine<S, T, F, A>
where
    S: SpeechSource,
    T: GazeTrainer,
    F: FlagStore,
    A: ActionSink,
{
    pub fn new(
        config: EngineConfig,
        parts: Collaborators<S, T, F, A>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        Self::with_commands(config, CommandTable::standard(), parts, clock, rng)
    }

    pub fn with_commands(
        config: EngineConfig,
        commands: CommandTable,
        parts: Collaborators<S, T, F, A>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        Self {
            gaze: GazeProcessor::new(config.gaze.clone()),
            coordinator: ScreenCoordinator::new(config.dwell.clone()),
            calibration: CalibrationProtocol::new(
                config.calibration.clone(),
                config.viewport,
                rng,
            ),
            tour: Tour::new(config.tour.clone()),
            voice: VoiceEngine::new(config.voice.clone(), commands, parts.speech),
            trainer: parts.trainer,
            persisted: PersistedState::open(parts.store),
            sink: parts.sink,
            listeners: Vec::new(),
            next_listener: 0,
            clock,
            config,
        }
    }

    /// Start listening, and calibrate if this user never has. A calibrated
    /// user who never finished the tour gets it again.
    pub fn start(&mut self, now: Instant) -> Vec<EngineEvent> {
        info!(
            "Interaction engine starting (viewport {}x{})",
            self.config.viewport.width, self.config.viewport.height
        );
        let mut events = Vec::new();
        let voice = self.voice.start();
        self.apply_voice(voice, now, &mut events);

        if !self.persisted.is_calibrated() && self.config.auto_calibrate {
            let first_run = self.persisted.flags().calibrated_at_ms.is_none();
            let cal = self.calibration.start(first_run, now);
            self.apply_calibration(cal, now, &mut events);
        } else if self.persisted.is_calibrated() && !self.persisted.tour_completed() {
            info!("Resuming unfinished tour");
            let tour = self.tour.start(now);
            self.apply_tour(tour, &mut events);
        }
        self.sync_snapping();
        events
    }

    // ── Gaze ────────────────────────────────────────────────

    /// Feed one sample from the gaze source (`None` = no face detected).
    pub fn on_gaze_sample(
        &mut self,
        sample: Option<RawGazeSample>,
        now: Instant,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let centers = if self.overlay_active() {
            Vec::new()
        } else {
            self.coordinator.centers()
        };
        let Some(point) = self.gaze.process(sample, &centers) else {
            return events;
        };

        for (id, listener) in &mut self.listeners {
            if let Err(e) = listener(point) {
                warn!("Gaze listener {:?} failed: {:#}", id, e);
            }
        }

        if self.calibration.is_running() {
            let cal = self.calibration.on_gaze(point, now);
            self.apply_calibration(cal, now, &mut events);
        } else if self.screen_gaze_live() {
            let fired = self.coordinator.update(point, now);
            self.dispatch_activations(fired, now, &mut events);
        }
        events
    }

    /// Register for every stabilized point.
    pub fn on_gaze(&mut self, listener: GazeListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_gaze_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    fn overlay_active(&self) -> bool {
        self.calibration.is_running() || self.tour.is_active()
    }

    /// Screen targets respond to gaze only once calibrated and with no
    /// calibration or tour overlay up.
    fn screen_gaze_live(&self) -> bool {
        self.persisted.is_calibrated() && !self.overlay_active()
    }

    fn sync_snapping(&mut self) {
        let suppressed = self.overlay_active();
        self.gaze.set_snapping_suppressed(suppressed);
    }

    // ── Screens ─────────────────────────────────────────────

    /// Replace the visible screen. Dictation into a field that is not on
    /// the new screen ends without completion.
    pub fn show_screen(&mut self, layout: &ScreenLayout, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if let Some(field) = self.voice.active_field() {
            if !layout.fields.iter().any(|f| f.id == field) {
                let voice = self.voice.switch_to_global_mode();
                self.apply_voice(voice, now, &mut events);
            }
        }
        self.coordinator.show(layout);
        events
    }

    fn dispatch_activations(
        &mut self,
        fired: Vec<Activation<ScreenTarget>>,
        now: Instant,
        events: &mut Vec<EngineEvent>,
    ) {
        for activation in fired {
            events.push(EngineEvent::Dwell {
                screen: self.coordinator.screen().map(str::to_string),
                target: activation.target_id.clone(),
            });
            match activation.action {
                ScreenTarget::Button { action, repeatable } => {
                    let ui = UiAction::Button {
                        screen: self.coordinator.screen().unwrap_or_default().to_string(),
                        id: activation.target_id.clone(),
                        action,
                    };
                    // A failed action leaves the target activated.
                    if self.perform(ui) && repeatable {
                        self.coordinator.rearm(&activation.target_id);
                    }
                }
                ScreenTarget::Field {
                    field,
                    on_complete,
                    exit_previous,
                } => {
                    // A refused wrapper stays activated until the screen
                    // changes or listening resumes.
                    let voice =
                        self.voice
                            .switch_to_field_mode(&field, on_complete, exit_previous, now);
                    self.apply_voice(voice, now, events);
                }
            }
        }
    }

    /// Enter dictation on a field of the visible screen by explicit request
    /// (pointer click, keyboard).
    pub fn request_field(&mut self, field: &str, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let target = self.coordinator.targets().get(field).map(|t| t.action.clone());
        match target {
            Some(ScreenTarget::Field {
                field,
                on_complete,
                exit_previous,
            }) => {
                let voice = self
                    .voice
                    .switch_to_field_mode(&field, on_complete, exit_previous, now);
                self.apply_voice(voice, now, &mut events);
            }
            _ => warn!("No dictation field {} on the visible screen", field),
        }
        events
    }

    fn perform(&mut self, action: UiAction) -> bool {
        match self.sink.perform(&action) {
            Ok(()) => true,
            Err(e) => {
                error!("UI action {:?} failed: {:#}", action, e);
                false
            }
        }
    }

    // ── Voice ───────────────────────────────────────────────

    pub fn on_speech(&mut self, event: SpeechEvent, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let voice = self.voice.handle(event, now);
        self.apply_voice(voice, now, &mut events);
        events
    }

    pub fn switch_to_global_mode(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let voice = self.voice.switch_to_global_mode();
        self.apply_voice(voice, now, &mut events);
        events
    }

    pub fn pause_global_listening(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let voice = self.voice.pause_global_listening();
        self.apply_voice(voice, now, &mut events);
        events
    }

    pub fn resume_global_listening(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let voice = self.voice.resume_global_listening();
        self.apply_voice(voice, now, &mut events);
        events
    }

    fn apply_voice(&mut self, voice: Vec<VoiceEvent>, now: Instant, events: &mut Vec<EngineEvent>) {
        for ev in voice {
            match &ev {
                VoiceEvent::Command { action, .. } => {
                    events.push(EngineEvent::Voice(ev.clone()));
                    self.run_command(action.clone(), now, events);
                    continue;
                }
                VoiceEvent::FieldValue { field, value } => {
                    self.perform(UiAction::SetFieldValue {
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
                VoiceEvent::DictationFinished {
                    field,
                    text,
                    on_complete,
                    ..
                } => {
                    match on_complete {
                        OnComplete::Nothing => {}
                        OnComplete::Submit => {
                            self.perform(UiAction::Submit {
                                field: field.clone(),
                                text: text.clone(),
                            });
                        }
                        OnComplete::Action(action) => {
                            self.perform(UiAction::Run {
                                action: action.clone(),
                                field: field.clone(),
                                text: text.clone(),
                            });
                        }
                    }
                    self.coordinator.rearm(field);
                }
                VoiceEvent::FieldExited { field, .. } => {
                    self.coordinator.rearm(field);
                }
                VoiceEvent::ChannelUnavailable { reason } => {
                    warn!("Voice channel unavailable: {}", reason);
                }
                VoiceEvent::ListeningResumed => {
                    let rearmed = self.coordinator.rearm_fields();
                    if rearmed > 0 {
                        debug!("Re-armed {} field wrapper(s) on resume", rearmed);
                    }
                }
                _ => {}
            }
            events.push(EngineEvent::Voice(ev));
        }
    }

    /// Commands the engine handles itself; everything else goes to the sink.
    fn run_command(&mut self, action: CommandAction, now: Instant, events: &mut Vec<EngineEvent>) {
        match action {
            CommandAction::Recalibrate => events.extend(self.recalibrate(now)),
            CommandAction::SkipCalibration => events.extend(self.skip_calibration(now)),
            CommandAction::SkipTour => events.extend(self.skip_tour()),
            CommandAction::Next if self.tour.is_active() => {
                let tour = self.tour.next(now);
                self.apply_tour(tour, events);
            }
            other => {
                self.perform(UiAction::Command(other));
            }
        }
    }

    // ── Calibration and tour ────────────────────────────────

    /// Clear the calibrated flag and run the full protocol again.
    pub fn recalibrate(&mut self, now: Instant) -> Vec<EngineEvent> {
        info!("Recalibration requested");
        let mut events = Vec::new();
        self.calibration.abort();
        self.tour.cancel();
        self.persisted.clear_calibrated();
        self.coordinator.rearm_all();
        let cal = self.calibration.start(false, now);
        self.apply_calibration(cal, now, &mut events);
        self.sync_snapping();
        events
    }

    pub fn dismiss_calibration_intro(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let cal = self.calibration.dismiss_intro(now);
        self.apply_calibration(cal, now, &mut events);
        events
    }

    pub fn skip_calibration(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let cal = self.calibration.skip();
        self.apply_calibration(cal, now, &mut events);
        events
    }

    pub fn skip_tour(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let tour = self.tour.skip();
        self.apply_tour(tour, &mut events);
        events
    }

    fn apply_calibration(
        &mut self,
        cal: Vec<CalibrationEvent>,
        now: Instant,
        events: &mut Vec<EngineEvent>,
    ) {
        for ev in cal {
            let chain_tour = match ev {
                CalibrationEvent::Completed => {
                    self.persisted.mark_calibrated(self.clock.unix_millis());
                    false
                }
                CalibrationEvent::Skipped => {
                    self.persisted.mark_calibrated(self.clock.unix_millis());
                    true
                }
                CalibrationEvent::Closed => true,
                _ => false,
            };
            events.push(EngineEvent::Calibration(ev));

            if chain_tour {
                self.gaze.reset_filter();
                self.coordinator.rearm_all();
                if !self.persisted.tour_completed() {
                    let tour = self.tour.start(now);
                    self.apply_tour(tour, events);
                }
            }
        }
        self.sync_snapping();
    }

    fn apply_tour(&mut self, tour: Vec<TourEvent>, events: &mut Vec<EngineEvent>) {
        for ev in tour {
            if matches!(ev, TourEvent::Finished | TourEvent::Skipped) {
                self.persisted.mark_tour_completed();
            }
            events.push(EngineEvent::Tour(ev));
        }
        self.sync_snapping();
    }

    // ── Time ────────────────────────────────────────────────

    /// Run every timer due at `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let cal = self.calibration.tick(now, &mut self.trainer);
        self.apply_calibration(cal, now, &mut events);

        let tour = self.tour.tick(now);
        self.apply_tour(tour, &mut events);

        let voice = self.voice.tick(now);
        self.apply_voice(voice, now, &mut events);

        if self.screen_gaze_live() {
            let fired = self.coordinator.tick(now);
            self.dispatch_activations(fired, now, &mut events);
        }
        events
    }

    /// Earliest instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.calibration.next_deadline(),
            self.tour.next_deadline(),
            self.voice.next_deadline(),
            if self.screen_gaze_live() {
                self.coordinator.next_deadline()
            } else {
                None
            },
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ── State ───────────────────────────────────────────────

    /// Forget calibration and tour completion (test reset).
    pub fn reset_persisted_state(&mut self) {
        info!("Resetting persisted interaction state");
        self.persisted.reset_all();
    }

    pub fn status(&self) -> EngineStatus {
        let health = self.gaze.health();
        EngineStatus {
            calibrated: self.persisted.is_calibrated(),
            tour_completed: self.persisted.tour_completed(),
            calibration: self.calibration.phase().as_str(),
            tour: self.tour.status().as_str(),
            voice_mode: self.voice.mode().as_str(),
            listening: self.voice.status().as_str(),
            active_field: self.voice.active_field().map(str::to_string),
            screen: self.coordinator.screen().map(str::to_string),
            tracking_lost: health.tracking_lost,
            valid_samples: health.valid_samples,
            rejected_samples: self.gaze.smoother().rejected_count(),
            recognition_restarts: self.voice.supervisor().restarts(),
        }
    }

    pub fn flags(&self) -> &PersistedFlags {
        self.persisted.flags()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gaze(&self) -> &GazeProcessor {
        &self.gaze
    }

    pub fn calibration(&self) -> &CalibrationProtocol {
        &self.calibration
    }

    pub fn tour(&self) -> &Tour {
        &self.tour
    }

    pub fn voice(&self) -> &VoiceEngine<S> {
        &self.voice
    }

    pub fn coordinator(&self) -> &ScreenCoordinator {
        &self.coordinator
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn store(&self) -> &F {
        self.persisted.store()
    }

    pub fn shutdown(&mut self) {
        debug!("Interaction engine shutting down");
        self.calibration.abort();
        self.tour.cancel();
        self.voice.switch_to_global_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::NullTrainer;
    use crate::clock::TestClock;
    use crate::geometry::Rect;
    use crate::persist::MemoryStore;
    use crate::screen::RecordingSink;
    use crate::voice::{ManualSpeechSource, SpeechErrorKind};
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    type TestEngine = InteractionEngine<ManualSpeechSource, NullTrainer, MemoryStore, RecordingSink>;

    fn engine(flags: PersistedFlags) -> TestEngine {
        InteractionEngine::new(
            EngineConfig::default(),
            Collaborators {
                speech: ManualSpeechSource::default(),
                trainer: NullTrainer,
                store: MemoryStore::with_flags(flags),
                sink: RecordingSink::default(),
            },
            Arc::new(TestClock::new()),
            StdRng::seed_from_u64(11),
        )
    }

    /// Look at `(x, y)` every 50ms over `[from, to]`, ticking alongside.
    fn hold(e: &mut TestEngine, t0: Instant, x: f64, y: f64, from: u64, to: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let mut t = from;
        while t <= to {
            let at = t0 + Duration::from_millis(t);
            events.extend(e.on_gaze_sample(Some(RawGazeSample::new(x, y, at)), at));
            events.extend(e.tick(at));
            t += 50;
        }
        events
    }

    fn button_actions(e: &TestEngine, action: &str) -> usize {
        e.sink()
            .actions
            .iter()
            .filter(|a| matches!(a, UiAction::Button { action: name, .. } if name == action))
            .count()
    }

    fn calibrated() -> PersistedFlags {
        PersistedFlags {
            gaze_calibrated: true,
            tour_completed: true,
            calibrated_at_ms: Some(1),
        }
    }

    #[test]
    fn test_uncalibrated_start_runs_calibration_with_intro() {
        let t0 = Instant::now();
        let mut e = engine(PersistedFlags::default());
        let ev = e.start(t0);
        assert!(ev.contains(&EngineEvent::Calibration(CalibrationEvent::IntroShown)));
        assert!(e.gaze().snapping_suppressed());
        assert_eq!(e.status().calibration, "intro");
    }

    #[test]
    fn test_calibrated_start_is_quiet() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        assert!(e.start(t0).is_empty());
        assert!(!e.gaze().snapping_suppressed());
        assert_eq!(e.status().listening, "active");
    }

    #[test]
    fn test_skip_persists_and_chains_tour_on_first_run() {
        let t0 = Instant::now();
        let mut e = engine(PersistedFlags::default());
        e.start(t0);
        let ev = e.skip_calibration(t0);
        assert!(ev.contains(&EngineEvent::Calibration(CalibrationEvent::Skipped)));
        assert!(e.flags().gaze_calibrated);
        assert!(e.tour().is_active());
        assert!(e.gaze().snapping_suppressed());

        e.skip_tour();
        assert!(e.flags().tour_completed);
        assert!(!e.gaze().snapping_suppressed());
    }

    #[test]
    fn test_voice_recalibrate_clears_flag() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.start(t0);
        let ev = e.on_speech(SpeechEvent::Final("eyeq recalibrate".into()), t0);
        assert!(ev.contains(&EngineEvent::Calibration(CalibrationEvent::CountdownStarted)));
        assert!(!e.flags().gaze_calibrated);
        assert!(e.calibration().is_running());
        assert!(e.sink().actions.is_empty());
    }

    #[test]
    fn test_unhandled_command_goes_to_sink() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.start(t0);
        e.on_speech(SpeechEvent::Final("eyeq home".into()), t0);
        assert_eq!(
            e.sink().actions,
            vec![UiAction::Command(CommandAction::NavigateHome)]
        );
    }

    #[test]
    fn test_gaze_listeners_survive_errors() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.start(t0);
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        e.on_gaze(Box::new(|_| Err(anyhow::anyhow!("listener broke"))));
        let id = e.on_gaze(Box::new(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        }));
        e.on_gaze_sample(Some(RawGazeSample::new(10.0, 10.0, t0)), t0);
        e.on_gaze_sample(None, t0);
        assert_eq!(*seen.borrow(), 1);
        assert!(e.remove_gaze_listener(id));
        assert!(!e.remove_gaze_listener(id));
    }

    #[test]
    fn test_uncalibrated_gaze_does_not_fire_buttons() {
        let t0 = Instant::now();
        let mut flags = calibrated();
        flags.gaze_calibrated = false;
        let mut e = engine(flags);
        let mut config = EngineConfig::default();
        config.auto_calibrate = false;
        e.config = config;
        e.start(t0);
        e.show_screen(
            &ScreenLayout::new("home").with_button("b", Rect::new(0.0, 0.0, 100.0, 100.0), "go"),
            t0,
        );
        let mut t = 0;
        while t <= 2000 {
            let at = t0 + Duration::from_millis(t);
            e.on_gaze_sample(Some(RawGazeSample::new(50.0, 50.0, at)), at);
            e.tick(at);
            t += 50;
        }
        assert!(e.sink().actions.is_empty());
    }

    #[test]
    fn test_failed_action_completes_without_retry() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.sink.fail_on = Some("delete-deck".into());
        e.start(t0);
        e.show_screen(
            &ScreenLayout::new("home")
                .with_button("del", Rect::new(100.0, 100.0, 200.0, 150.0), "delete-deck")
                .with_button("next", Rect::new(500.0, 100.0, 600.0, 150.0), "next-card"),
            t0,
        );

        let ev = hold(&mut e, t0, 150.0, 125.0, 0, 4000);
        let dwells = ev
            .iter()
            .filter(|ev| matches!(ev, EngineEvent::Dwell { .. }))
            .count();
        assert_eq!(dwells, 1);
        assert_eq!(button_actions(&e, "delete-deck"), 1);
        let del = e.coordinator().targets().get("del").unwrap();
        assert!(del.is_activated());
        assert_eq!(del.progress(t0 + Duration::from_millis(4000)), 1.0);

        // The failure does not block other targets.
        hold(&mut e, t0, 550.0, 125.0, 4050, 7000);
        assert_eq!(button_actions(&e, "next-card"), 1);
        assert_eq!(button_actions(&e, "delete-deck"), 1);
    }

    #[test]
    fn test_repeatable_button_rearms_only_on_success() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.sink.fail_on = Some("delete-deck".into());
        e.start(t0);
        let mut layout = ScreenLayout::new("study")
            .with_button("next", Rect::new(100.0, 100.0, 200.0, 150.0), "next-card")
            .with_button("retry", Rect::new(500.0, 100.0, 600.0, 150.0), "delete-deck");
        layout.buttons[0].repeatable = true;
        layout.buttons[1].repeatable = true;
        e.show_screen(&layout, t0);

        // Held for 3.4s: fires at 1.5s, re-arms, fires again.
        hold(&mut e, t0, 150.0, 125.0, 0, 3400);
        assert_eq!(button_actions(&e, "next-card"), 2);

        hold(&mut e, t0, 550.0, 125.0, 3450, 9000);
        assert_eq!(button_actions(&e, "delete-deck"), 1);
        assert!(e.coordinator().targets().get("retry").unwrap().is_activated());
    }

    #[test]
    fn test_refused_field_reports_once_per_visit() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.start(t0);
        let layout = ScreenLayout::new("study").with_field(
            "answer",
            Rect::new(100.0, 100.0, 600.0, 160.0),
            OnComplete::Submit,
        );
        e.show_screen(&layout, t0);
        e.on_speech(SpeechEvent::Error(SpeechErrorKind::NotAllowed), t0);
        e.on_speech(SpeechEvent::SessionEnded, t0);
        assert_eq!(e.status().listening, "failed");

        let ev = hold(&mut e, t0, 350.0, 130.0, 0, 8000);
        let refusals = ev
            .iter()
            .filter(|ev| matches!(ev, EngineEvent::Voice(VoiceEvent::ChannelUnavailable { .. })))
            .count();
        assert_eq!(refusals, 1);
        assert!(e.coordinator().targets().get("answer").unwrap().is_activated());

        // A new visit to the screen arms the wrapper again.
        e.show_screen(&layout, t0 + Duration::from_millis(8000));
        let ev = hold(&mut e, t0, 350.0, 130.0, 8050, 10_000);
        assert!(ev
            .iter()
            .any(|ev| matches!(ev, EngineEvent::Voice(VoiceEvent::ChannelUnavailable { .. }))));
    }

    #[test]
    fn test_field_refused_while_paused_rearms_on_resume() {
        let t0 = Instant::now();
        let mut e = engine(calibrated());
        e.start(t0);
        e.show_screen(
            &ScreenLayout::new("study").with_field(
                "answer",
                Rect::new(100.0, 100.0, 600.0, 160.0),
                OnComplete::Submit,
            ),
            t0,
        );
        e.pause_global_listening(t0);

        hold(&mut e, t0, 350.0, 130.0, 0, 2000);
        assert!(e.voice().active_field().is_none());
        assert!(e.coordinator().targets().get("answer").unwrap().is_activated());

        let resumed = e.resume_global_listening(t0 + Duration::from_millis(2000));
        assert!(resumed.contains(&EngineEvent::Voice(VoiceEvent::ListeningResumed)));
        assert!(!e.coordinator().targets().get("answer").unwrap().is_activated());

        let ev = hold(&mut e, t0, 350.0, 130.0, 2050, 4000);
        assert!(ev.iter().any(|ev| matches!(
            ev,
            EngineEvent::Voice(VoiceEvent::FieldListening { field }) if field == "answer"
        )));
        assert_eq!(e.voice().active_field(), Some("answer"));
    }

    #[test]
    fn test_calibrated_start_resumes_unfinished_tour() {
        let t0 = Instant::now();
        let mut flags = calibrated();
        flags.tour_completed = false;
        let mut e = engine(flags);
        let ev = e.start(t0);
        assert!(ev
            .iter()
            .any(|ev| matches!(ev, EngineEvent::Tour(TourEvent::StepShown { index: 0, .. }))));
        assert!(!ev.iter().any(|ev| matches!(ev, EngineEvent::Calibration(_))));
        assert!(e.tour().is_active());
        assert!(e.gaze().snapping_suppressed());

        e.skip_tour();
        assert!(e.flags().tour_completed);
        assert!(!e.gaze().snapping_suppressed());
    }
}
