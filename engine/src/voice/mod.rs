//! Voice command and dictation engine.
//!
//! One continuous recognition session feeds two modes. In global mode each
//! final utterance is matched against the command table. In field mode the
//! utterances are dictation for a single text field, finished by silence or
//! by a spoken "done" phrase.

pub mod commands;
pub mod engine;
pub mod session;

pub use commands::{CommandAction, CommandEntry, CommandTable};
pub use engine::VoiceEngine;
pub use session::{RecognitionSupervisor, RestartDecision, SessionStatus};

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::EngineError;

// ── Config ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Start listening when the engine starts.
    pub enabled: bool,
    /// Dictation ends after this long without a recognized result.
    pub silence_timeout_ms: u64,
    /// Minimum gap between two dispatched global commands. Recognizers
    /// often deliver the same command twice in quick succession.
    pub command_cooldown_ms: u64,
    /// Phrases that end dictation immediately.
    pub done_phrases: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            silence_timeout_ms: 2000,
            command_cooldown_ms: 1000,
            done_phrases: commands::WAKE_WORDS
                .iter()
                .map(|w| format!("{} done", w))
                .collect(),
        }
    }
}

// ── Speech source seam ──────────────────────────────────────

/// The external recognizer. Only the voice engine calls these.
pub trait SpeechSource {
    /// Open a continuous session.
    fn start(&mut self) -> anyhow::Result<()>;
    /// Close the session without reporting an error.
    fn abort(&mut self);
}

/// Recognizer error codes, named after the Web Speech API values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechErrorKind {
    NoSpeech,
    Network,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    Other(String),
}

impl SpeechErrorKind {
    /// Fatal errors stop auto-restart until the app restarts listening.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotAllowed | Self::ServiceNotAllowed | Self::AudioCapture
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Network => "network",
            Self::Aborted => "aborted",
            Self::NotAllowed => "not-allowed",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Other(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Events delivered by the speech source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum SpeechEvent {
    Interim(String),
    Final(String),
    SessionEnded,
    Error(SpeechErrorKind),
}

/// Source that accepts every start, for running without a recognizer
/// attached (events are injected directly) and for tests.
#[derive(Debug, Default, Clone)]
pub struct ManualSpeechSource {
    pub starts: usize,
    pub aborts: usize,
    pub listening: bool,
}

impl SpeechSource for ManualSpeechSource {
    fn start(&mut self) -> anyhow::Result<()> {
        self.starts += 1;
        self.listening = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborts += 1;
        self.listening = false;
    }
}

/// Source for platforms with no recognizer. Every start fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSpeechSource;

impl SpeechSource for UnavailableSpeechSource {
    fn start(&mut self) -> anyhow::Result<()> {
        Err(EngineError::SpeechUnavailable("no recognizer on this platform".to_string()).into())
    }

    fn abort(&mut self) {}
}

// ── Modes and events ────────────────────────────────────────

/// What to do with a field's text once dictation completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnComplete {
    /// Leave the text in the field.
    #[default]
    Nothing,
    /// Submit the field's form (answer check, send message).
    Submit,
    /// Run a named screen action.
    Action(String),
}

/// How to leave an active field when a different one takes over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Run the old field's completion with whatever was dictated.
    Flush,
    /// Leave without completing.
    #[default]
    Discard,
}

/// Why dictation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictationReason {
    Silence,
    DonePhrase,
    Explicit,
    /// Another field took over with `ExitPolicy::Flush`.
    Superseded,
}

impl DictationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silence => "silence",
            Self::DonePhrase => "done-phrase",
            Self::Explicit => "explicit",
            Self::Superseded => "superseded",
        }
    }
}

/// The one field currently receiving dictation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSession {
    pub field: String,
    pub on_complete: OnComplete,
    pub accumulated: String,
    pub interim: Option<String>,
    pub started: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceMode {
    Global,
    Field(FieldSession),
}

impl VoiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Field(_) => "field",
        }
    }
}

/// Output of the voice engine, in the order things happened.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Command {
        action: CommandAction,
        utterance: String,
    },
    FieldListening {
        field: String,
    },
    /// Live feedback only; not written into the field.
    InterimText {
        field: String,
        text: String,
    },
    /// Write `value` into the field now.
    FieldValue {
        field: String,
        value: String,
    },
    DictationFinished {
        field: String,
        text: String,
        on_complete: OnComplete,
        reason: DictationReason,
    },
    /// Field left without running its completion.
    FieldExited {
        field: String,
        text: String,
    },
    ListeningPaused,
    ListeningResumed,
    SessionRestarted {
        restarts: u64,
    },
    ChannelUnavailable {
        reason: String,
    },
}
