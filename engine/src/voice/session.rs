//! Recognition session supervision.
//!
//! Browsers and most cloud recognizers end a "continuous" session on their
//! own after a while. An ended session is a transient event: the supervisor
//! asks for a restart unless listening was paused or the channel failed.

use tracing::{debug, warn};

use super::SpeechErrorKind;

/// State of the single recognition subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Never started, or voice is disabled.
    Idle,
    Active,
    /// Another consumer holds the recognizer; no auto-restart.
    Paused,
    /// Permission denied or hardware gone; no auto-restart.
    Failed(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Failed(_) => "failed",
        }
    }
}

/// What to do after a session-ended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    StayStopped,
}

#[derive(Debug, Clone)]
pub struct RecognitionSupervisor {
    status: SessionStatus,
    restarts: u64,
    last_error: Option<SpeechErrorKind>,
}

impl Default for RecognitionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionSupervisor {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
            restarts: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SessionStatus::Failed(_))
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn last_error(&self) -> Option<&SpeechErrorKind> {
        self.last_error.as_ref()
    }

    pub fn mark_active(&mut self) {
        self.status = SessionStatus::Active;
    }

    pub fn pause(&mut self) {
        self.status = SessionStatus::Paused;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Speech recognition failed: {}", reason);
        self.status = SessionStatus::Failed(reason);
    }

    /// The recognizer ended its session on its own.
    pub fn on_session_end(&mut self) -> RestartDecision {
        match self.status {
            SessionStatus::Active => {
                self.restarts += 1;
                debug!("Recognition session ended, restart #{}", self.restarts);
                RestartDecision::Restart
            }
            _ => RestartDecision::StayStopped,
        }
    }

    /// Record a recognizer error. Returns true when it is fatal and the
    /// channel has been marked failed.
    pub fn on_error(&mut self, kind: &SpeechErrorKind) -> bool {
        self.last_error = Some(kind.clone());
        if kind.is_fatal() {
            self.fail(kind.as_str());
            return true;
        }
        debug!("Transient recognition error: {}", kind.as_str());
        false
    }
}
