//! Global-mode voice commands.
//!
//! Lookup is deliberately loose: the utterance is lower-cased and the first
//! entry with any phrase contained in it wins. Every default phrase starts
//! with the wake word so ordinary conversation near the microphone does not
//! trigger navigation.

use serde::{Deserialize, Serialize};

/// What a recognized command asks the app to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandAction {
    NavigateHome,
    NavigateFlashcards,
    NavigateQuizzes,
    NavigateCreate,
    NavigateLibrary,
    Recalibrate,
    OpenAssistant,
    CloseAssistant,
    SkipTour,
    SkipCalibration,
    Next,
    Back,
    Flip,
    Hint,
    Select,
    ReadAloud,
    /// Screen-specific action, routed to the action sink by name.
    Custom(String),
}

impl CommandAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NavigateHome => "navigate-home",
            Self::NavigateFlashcards => "navigate-flashcards",
            Self::NavigateQuizzes => "navigate-quizzes",
            Self::NavigateCreate => "navigate-create",
            Self::NavigateLibrary => "navigate-library",
            Self::Recalibrate => "recalibrate",
            Self::OpenAssistant => "open-assistant",
            Self::CloseAssistant => "close-assistant",
            Self::SkipTour => "skip-tour",
            Self::SkipCalibration => "skip-calibration",
            Self::Next => "next",
            Self::Back => "back",
            Self::Flip => "flip",
            Self::Hint => "hint",
            Self::Select => "select",
            Self::ReadAloud => "read-aloud",
            Self::Custom(name) => name,
        }
    }

    /// Parse an action name. Unknown names become `Custom`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "navigate-home" => Self::NavigateHome,
            "navigate-flashcards" => Self::NavigateFlashcards,
            "navigate-quizzes" => Self::NavigateQuizzes,
            "navigate-create" => Self::NavigateCreate,
            "navigate-library" => Self::NavigateLibrary,
            "recalibrate" => Self::Recalibrate,
            "open-assistant" => Self::OpenAssistant,
            "close-assistant" => Self::CloseAssistant,
            "skip-tour" => Self::SkipTour,
            "skip-calibration" => Self::SkipCalibration,
            "next" => Self::Next,
            "back" => Self::Back,
            "flip" => Self::Flip,
            "hint" => Self::Hint,
            "select" => Self::Select,
            "read-aloud" => Self::ReadAloud,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// One table row: any of `phrases` maps to `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub phrases: Vec<String>,
    pub action: CommandAction,
}

/// Wake-word spellings the recognizer commonly produces for "EyeQ".
pub const WAKE_WORDS: [&str; 3] = ["eyeq", "eye q", "i q"];

/// Ordered phrase table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Phrases are stored lower-cased.
    pub fn with<I, P>(mut self, phrases: I, action: CommandAction) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.push(phrases, action);
        self
    }

    pub fn push<I, P>(&mut self, phrases: I, action: CommandAction)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self.entries.push(CommandEntry { phrases, action });
    }

    /// Append an entry for `suffix` spoken after every wake word.
    pub fn with_wake<S: AsRef<str>>(self, suffixes: &[S], action: CommandAction) -> Self {
        let phrases: Vec<String> = WAKE_WORDS
            .iter()
            .flat_map(|w| suffixes.iter().map(move |s| format!("{} {}", w, s.as_ref())))
            .collect();
        self.with(phrases, action)
    }

    /// First entry whose phrase occurs anywhere in `utterance`.
    pub fn lookup(&self, utterance: &str) -> Option<&CommandAction> {
        let lowered = utterance.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.phrases.iter().any(|p| lowered.contains(p.as_str())))
            .map(|e| &e.action)
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The app-wide table.
    pub fn standard() -> Self {
        Self::new()
            .with_wake(&["skip calibration", "stop calibration"], CommandAction::SkipCalibration)
            .with_wake(&["skip tour", "end tour"], CommandAction::SkipTour)
            .with_wake(&["recalibrate", "calibrate"], CommandAction::Recalibrate)
            .with_wake(&["home", "go home"], CommandAction::NavigateHome)
            .with_wake(&["flashcards", "flash cards"], CommandAction::NavigateFlashcards)
            .with_wake(&["quiz", "quizzes"], CommandAction::NavigateQuizzes)
            .with_wake(&["create", "new set"], CommandAction::NavigateCreate)
            .with_wake(&["library"], CommandAction::NavigateLibrary)
            .with_wake(&["close assistant", "close chat"], CommandAction::CloseAssistant)
            .with_wake(&["assistant", "help me", "chat"], CommandAction::OpenAssistant)
            .with_wake(&["next"], CommandAction::Next)
            .with_wake(&["back", "previous"], CommandAction::Back)
            .with_wake(&["flip"], CommandAction::Flip)
            .with_wake(&["hint"], CommandAction::Hint)
            .with_wake(&["select", "choose"], CommandAction::Select)
            .with_wake(&["read"], CommandAction::ReadAloud)
    }
}
