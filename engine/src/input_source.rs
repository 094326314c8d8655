//! Scripted input for replaying sessions without a camera or microphone.
//!
//! A script is a JSON document with the screen layouts it uses and a flat
//! list of `InputEvent`s: gaze samples, speech results, navigation and
//! `wait` steps. The runtime feeds these to the engine either in real time
//! or against a simulated clock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::screen::ScreenLayout;
use crate::voice::{SpeechErrorKind, SpeechEvent};

/// One scripted input step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Raw gaze estimate in viewport pixels.
    Gaze { x: f64, y: f64 },
    /// The tracker produced no estimate.
    GazeLost,
    Interim { text: String },
    Final { text: String },
    /// The recognizer session ended on its own.
    SessionEnded,
    /// Recognizer error code, e.g. `no-speech` or `not-allowed`.
    SpeechError { code: String },
    /// Navigate to a layout by name.
    Show { screen: String },
    /// Start dictation into a field, as if its wrapper were dwelt on.
    RequestField { field: String },
    Pause,
    Resume,
    SkipCalibration,
    DismissIntro,
    Recalibrate,
    SkipTour,
    /// Let time pass.
    Wait { ms: u64 },
}

impl InputEvent {
    /// Speech events map onto what a recognizer would deliver.
    pub fn as_speech(&self) -> Option<SpeechEvent> {
        match self {
            InputEvent::Interim { text } => Some(SpeechEvent::Interim(text.clone())),
            InputEvent::Final { text } => Some(SpeechEvent::Final(text.clone())),
            InputEvent::SessionEnded => Some(SpeechEvent::SessionEnded),
            InputEvent::SpeechError { code } => {
                Some(SpeechEvent::Error(SpeechErrorKind::from_str(code)))
            }
            _ => None,
        }
    }

    pub fn wait_duration(&self) -> Option<Duration> {
        match self {
            InputEvent::Wait { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// A replayable session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub layouts: Vec<ScreenLayout>,
    #[serde(default)]
    pub events: Vec<InputEvent>,
}

impl Script {
    pub fn from_json(text: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(text).map_err(|source| EngineError::Json {
            what: "input script".to_string(),
            source,
        })?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Store {
            path: path.to_path_buf(),
            source,
        })?;
        let script: Self = serde_json::from_str(&text).map_err(|source| EngineError::Json {
            what: path.display().to_string(),
            source,
        })?;
        script.validate()?;
        Ok(script)
    }

    fn validate(&self) -> Result<()> {
        self.layouts.iter().try_for_each(ScreenLayout::validate)
    }

    /// Total scripted waiting time.
    pub fn duration(&self) -> Duration {
        self.events.iter().filter_map(InputEvent::wait_duration).sum()
    }

    pub fn layout(&self, name: &str) -> Option<&ScreenLayout> {
        self.layouts.iter().find(|l| l.name == name)
    }
}

/// Source of input events for the runtime.
pub trait InputProvider: Send {
    fn next_event(&mut self) -> Option<InputEvent>;
    fn has_events(&self) -> bool;
}

/// Delivers events from a fixed queue.
pub struct ScriptedInputProvider {
    events: VecDeque<InputEvent>,
}

impl ScriptedInputProvider {
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl From<Script> for ScriptedInputProvider {
    fn from(script: Script) -> Self {
        Self::new(script.events)
    }
}

impl InputProvider for ScriptedInputProvider {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Wraps a provider and keeps a copy of everything it delivered.
pub struct RecordingProvider<P: InputProvider> {
    inner: P,
    recorded: Vec<InputEvent>,
}

impl<P: InputProvider> RecordingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    pub fn recorded(&self) -> &[InputEvent] {
        &self.recorded
    }

    pub fn into_recorded(self) -> Vec<InputEvent> {
        self.recorded
    }
}

impl<P: InputProvider> InputProvider for RecordingProvider<P> {
    fn next_event(&mut self) -> Option<InputEvent> {
        let event = self.inner.next_event()?;
        self.recorded.push(event.clone());
        Some(event)
    }

    fn has_events(&self) -> bool {
        self.inner.has_events()
    }
}
