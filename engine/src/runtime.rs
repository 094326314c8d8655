//! Event loop driving an `InteractionEngine` from an input provider.
//!
//! Two drivers share the same `Runtime` state:
//!
//! - `run` is a calloop loop on real time. A feeder thread plays the
//!   provider into a calloop channel (sleeping through `wait` steps); the
//!   loop sleeps until the engine's next deadline, ticks it, and logs a
//!   status line periodically. SIGINT/SIGTERM stop it cleanly.
//! - `simulate` replays a provider against a `TestClock`, jumping straight
//!   to each deadline. Results are deterministic and take no wall time.

use calloop::channel::{self, Channel, Sender};
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::calibration::GazeTrainer;
use crate::clock::{Clock, TestClock};
use crate::engine::{EngineEvent, InteractionEngine};
use crate::gaze::RawGazeSample;
use crate::input_source::{InputEvent, InputProvider};
use crate::persist::FlagStore;
use crate::screen::{ActionSink, ScreenLayout};
use crate::voice::SpeechSource;

/// Real-time loop settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Longest the loop sleeps when nothing is scheduled.
    pub poll_interval_ms: u64,
    pub status_interval_secs: u64,
    /// Stop after this many seconds regardless of pending work.
    pub exit_after_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            status_interval_secs: 30,
            exit_after_secs: None,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub inputs: u64,
    pub engine_events: u64,
    pub ticks: u64,
}

pub struct Runtime<S, T, F, A>
where
    S: SpeechSource,
    T: GazeTrainer,
    F: FlagStore,
    A: ActionSink,
{
    engine: InteractionEngine<S, T, F, A>,
    layouts: HashMap<String, ScreenLayout>,
    clock: Arc<dyn Clock>,
    running: bool,
    input_closed: bool,
    stats: RuntimeStats,
}

impl<S, T, F, A> Runtime<S, T, F, A>
where
    S: SpeechSource,
    T: GazeTrainer,
    F: FlagStore,
    A: ActionSink,
{
    /// `clock` must be the clock the engine was built with.
    pub fn new(
        engine: InteractionEngine<S, T, F, A>,
        layouts: Vec<ScreenLayout>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            layouts: layouts.into_iter().map(|l| (l.name.clone(), l)).collect(),
            clock,
            running: true,
            input_closed: false,
            stats: RuntimeStats::default(),
        }
    }

    pub fn start(&mut self) -> Vec<EngineEvent> {
        let events = self.engine.start(self.clock.now());
        self.record(&events);
        events
    }

    /// Feed one input to the engine at the current clock reading.
    pub fn apply(&mut self, input: InputEvent) -> Vec<EngineEvent> {
        let now = self.clock.now();
        self.stats.inputs += 1;
        if let Some(speech) = input.as_speech() {
            let events = self.engine.on_speech(speech, now);
            self.record(&events);
            return events;
        }
        let events = match input {
            InputEvent::Gaze { x, y } => self
                .engine
                .on_gaze_sample(Some(RawGazeSample::new(x, y, now)), now),
            InputEvent::GazeLost => self.engine.on_gaze_sample(None, now),
            InputEvent::Show { screen } => match self.layouts.get(&screen) {
                Some(layout) => self.engine.show_screen(layout, now),
                None => {
                    warn!("Unknown screen '{}', ignoring", screen);
                    Vec::new()
                }
            },
            InputEvent::RequestField { field } => self.engine.request_field(&field, now),
            InputEvent::Pause => self.engine.pause_global_listening(now),
            InputEvent::Resume => self.engine.resume_global_listening(now),
            InputEvent::SkipCalibration => self.engine.skip_calibration(now),
            InputEvent::DismissIntro => self.engine.dismiss_calibration_intro(now),
            InputEvent::Recalibrate => self.engine.recalibrate(now),
            InputEvent::SkipTour => self.engine.skip_tour(),
            // Waits are consumed by the driver; speech was handled above.
            InputEvent::Wait { .. }
            | InputEvent::Interim { .. }
            | InputEvent::Final { .. }
            | InputEvent::SessionEnded
            | InputEvent::SpeechError { .. } => Vec::new(),
        };
        self.record(&events);
        events
    }

    /// Run whatever timers are due at the current clock reading.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let events = self.engine.tick(self.clock.now());
        self.stats.ticks += 1;
        self.record(&events);
        events
    }

    fn record(&mut self, events: &[EngineEvent]) {
        self.stats.engine_events += events.len() as u64;
        for event in events {
            debug!("Engine event: {:?}", event);
        }
    }

    /// Input is exhausted and no timer is pending.
    pub fn is_idle(&self) -> bool {
        self.input_closed && self.engine.next_deadline().is_none()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn engine(&self) -> &InteractionEngine<S, T, F, A> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut InteractionEngine<S, T, F, A> {
        &mut self.engine
    }

    pub fn into_engine(self) -> InteractionEngine<S, T, F, A> {
        self.engine
    }

    // ── Simulated time ──────────────────────────────────────

    /// Move `clock` forward by `by`, stopping at every engine deadline on
    /// the way. `clock` must be the runtime's clock.
    pub fn advance(&mut self, clock: &TestClock, by: Duration) -> Vec<EngineEvent> {
        let end = clock.now() + by;
        let mut events = Vec::new();
        while let Some(due) = self.engine.next_deadline().filter(|d| *d <= end) {
            let now = clock.now();
            if due > now {
                clock.advance(due - now);
            }
            events.extend(self.tick());
            if self.engine.next_deadline() == Some(due) {
                warn!("Deadline did not clear after tick, leaving it for later");
                break;
            }
        }
        let now = clock.now();
        if end > now {
            clock.advance(end - now);
        }
        events.extend(self.tick());
        events
    }

    /// Replay every input from `provider`, advancing `clock` through
    /// `wait` steps.
    pub fn simulate<P: InputProvider>(
        &mut self,
        clock: &TestClock,
        provider: &mut P,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(input) = provider.next_event() {
            match input.wait_duration() {
                Some(wait) => events.extend(self.advance(clock, wait)),
                None => events.extend(self.apply(input)),
            }
        }
        self.input_closed = true;
        info!(
            "Simulated replay done: {} input(s), {} engine event(s)",
            self.stats.inputs, self.stats.engine_events
        );
        events
    }

    // ── Real time ───────────────────────────────────────────

    /// Run the calloop loop until input is exhausted and idle, the exit
    /// timer fires, or a signal arrives.
    pub fn run<P>(&mut self, provider: P, config: RuntimeConfig) -> anyhow::Result<RuntimeStats>
    where
        P: InputProvider + 'static,
    {
        let mut event_loop = EventLoop::<Self>::try_new()?;
        let handle = event_loop.handle();

        let signals = Signals::new(&[Signal::SIGTERM, Signal::SIGINT])
            .map_err(|e| anyhow::anyhow!("failed to create signal source: {}", e))?;
        handle
            .insert_source(signals, |event, _, state: &mut Self| {
                info!("Received signal {:?}, shutting down", event.signal());
                state.running = false;
            })
            .map_err(|e| anyhow::anyhow!("failed to register signal handler: {}", e.error))?;

        let (sender, input): (Sender<InputEvent>, Channel<InputEvent>) = channel::channel();
        handle
            .insert_source(input, |event, _, state: &mut Self| match event {
                channel::Event::Msg(input) => {
                    state.apply(input);
                }
                channel::Event::Closed => {
                    debug!("Input provider exhausted");
                    state.input_closed = true;
                }
            })
            .map_err(|e| anyhow::anyhow!("failed to register input channel: {}", e.error))?;

        let status_every = Duration::from_secs(config.status_interval_secs.max(1));
        handle
            .insert_source(Timer::from_duration(status_every), move |_, _, state: &mut Self| {
                let s = state.engine.status();
                info!(
                    "Status: calibrated={} calibration={} tour={} voice={}/{} field={:?} screen={:?} tracking_lost={} samples={}/{} rejected restarts={}",
                    s.calibrated,
                    s.calibration,
                    s.tour,
                    s.voice_mode,
                    s.listening,
                    s.active_field,
                    s.screen,
                    s.tracking_lost,
                    s.valid_samples,
                    s.rejected_samples,
                    s.recognition_restarts
                );
                TimeoutAction::ToDuration(status_every)
            })
            .map_err(|e| anyhow::anyhow!("failed to register status timer: {}", e.error))?;

        if let Some(seconds) = config.exit_after_secs {
            info!("Will exit after {} seconds", seconds);
            handle
                .insert_source(
                    Timer::from_duration(Duration::from_secs(seconds)),
                    |_, _, state: &mut Self| {
                        info!("Exit timer fired");
                        state.running = false;
                        TimeoutAction::Drop
                    },
                )
                .map_err(|e| anyhow::anyhow!("failed to register exit timer: {}", e.error))?;
        }

        // Spawned after the signal source so the feeder inherits its mask.
        let feeder = spawn_feeder(provider, sender);

        self.start();
        let poll = Duration::from_millis(config.poll_interval_ms.max(1));
        info!(
            "Runtime started (poll interval: {}ms), entering event loop",
            config.poll_interval_ms
        );

        while self.running {
            let now = self.clock.now();
            let timeout = match self.engine.next_deadline() {
                Some(due) => due.saturating_duration_since(now).min(poll),
                None => poll,
            };
            event_loop.dispatch(Some(timeout), self)?;
            self.tick();
            if self.is_idle() {
                info!("Input finished and no timers pending");
                self.running = false;
            }
        }

        self.engine.shutdown();
        drop(event_loop);
        if feeder.is_finished() {
            if let Ok(sent) = feeder.join() {
                debug!("Input feeder delivered {} event(s)", sent);
            }
        }
        info!(
            "Runtime stopped ({} input(s), {} engine event(s), {} tick(s))",
            self.stats.inputs, self.stats.engine_events, self.stats.ticks
        );
        Ok(self.stats)
    }
}

/// Play `provider` into `sender` on its own thread, sleeping through
/// `wait` steps. Dropping the sender at the end closes the channel.
fn spawn_feeder<P>(mut provider: P, sender: Sender<InputEvent>) -> JoinHandle<u64>
where
    P: InputProvider + 'static,
{
    std::thread::spawn(move || {
        let mut sent = 0;
        while let Some(event) = provider.next_event() {
            if let Some(wait) = event.wait_duration() {
                std::thread::sleep(wait);
                continue;
            }
            if sender.send(event).is_err() {
                debug!("Runtime stopped, input feeder exiting");
                break;
            }
            sent += 1;
        }
        sent
    })
}
