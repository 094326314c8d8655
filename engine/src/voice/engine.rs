//! The voice state machine: `global ⇄ field`, plus recognition supervision.
//!
//! `VoiceEngine` is the only owner of the recognition session and of the
//! active dictation field. Everything else goes through
//! `switch_to_field_mode`, `switch_to_global_mode`, `finish_dictation`,
//! `pause_global_listening` and `resume_global_listening`.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    CommandTable, DictationReason, ExitPolicy, FieldSession, OnComplete, RecognitionSupervisor,
    RestartDecision, SessionStatus, SpeechEvent, SpeechSource, VoiceConfig, VoiceEvent, VoiceMode,
};
use crate::scheduler::{Scheduler, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceTask {
    Silence,
}

pub struct VoiceEngine<S: SpeechSource> {
    config: VoiceConfig,
    commands: CommandTable,
    source: S,
    supervisor: RecognitionSupervisor,
    mode: VoiceMode,
    scheduler: Scheduler<VoiceTask>,
    silence_task: Option<TaskId>,
    last_command_at: Option<Instant>,
}

impl<S: SpeechSource> VoiceEngine<S> {
    pub fn new(config: VoiceConfig, commands: CommandTable, source: S) -> Self {
        Self {
            config,
            commands,
            source,
            supervisor: RecognitionSupervisor::new(),
            mode: VoiceMode::Global,
            scheduler: Scheduler::new(),
            silence_task: None,
            last_command_at: None,
        }
    }

    // ── Session lifecycle ───────────────────────────────────

    /// Start listening in global mode. A source that cannot start leaves
    /// the voice channel unavailable; gaze and pointer input are unaffected.
    pub fn start(&mut self) -> Vec<VoiceEvent> {
        if !self.config.enabled {
            info!("Voice control disabled");
            return Vec::new();
        }
        match self.source.start() {
            Ok(()) => {
                self.supervisor.mark_active();
                info!("Voice listening started ({} commands)", self.commands.len());
                Vec::new()
            }
            Err(e) => self.channel_failed(format!("{:#}", e)),
        }
    }

    fn channel_failed(&mut self, reason: String) -> Vec<VoiceEvent> {
        self.supervisor.fail(reason.clone());
        let mut events = self.leave_field();
        events.push(VoiceEvent::ChannelUnavailable { reason });
        events
    }

    /// Feed one event from the speech source.
    pub fn handle(&mut self, event: SpeechEvent, now: Instant) -> Vec<VoiceEvent> {
        match event {
            SpeechEvent::Interim(text) => self.on_interim(text, now),
            SpeechEvent::Final(text) => self.on_final(text, now),
            SpeechEvent::SessionEnded => self.on_session_end(),
            SpeechEvent::Error(kind) => {
                if self.supervisor.is_paused() {
                    // Aborting for a pause reports "aborted"; that is expected.
                    debug!("Ignoring recognition error while paused: {}", kind.as_str());
                    return Vec::new();
                }
                if self.supervisor.on_error(&kind) {
                    self.source.abort();
                    let mut events = self.leave_field();
                    events.push(VoiceEvent::ChannelUnavailable {
                        reason: kind.as_str().to_string(),
                    });
                    events
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn on_session_end(&mut self) -> Vec<VoiceEvent> {
        match self.supervisor.on_session_end() {
            RestartDecision::StayStopped => Vec::new(),
            RestartDecision::Restart => match self.source.start() {
                Ok(()) => vec![VoiceEvent::SessionRestarted {
                    restarts: self.supervisor.restarts(),
                }],
                Err(e) => self.channel_failed(format!("restart failed: {:#}", e)),
            },
        }
    }

    fn accepting_results(&self) -> bool {
        self.supervisor.is_active()
    }

    // ── Results ─────────────────────────────────────────────

    fn on_interim(&mut self, text: String, now: Instant) -> Vec<VoiceEvent> {
        if !self.accepting_results() {
            return Vec::new();
        }
        let VoiceMode::Field(session) = &mut self.mode else {
            return Vec::new();
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }
        session.interim = Some(text.clone());
        let field = session.field.clone();
        self.arm_silence(now);
        vec![VoiceEvent::InterimText { field, text }]
    }

    fn on_final(&mut self, text: String, now: Instant) -> Vec<VoiceEvent> {
        if !self.accepting_results() {
            return Vec::new();
        }
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        match self.mode {
            VoiceMode::Global => self.dispatch_command(text, now),
            VoiceMode::Field(_) => self.dictate(text, now),
        }
    }

    fn dispatch_command(&mut self, utterance: &str, now: Instant) -> Vec<VoiceEvent> {
        let Some(action) = self.commands.lookup(utterance).cloned() else {
            debug!("No command in utterance: {:?}", utterance);
            return Vec::new();
        };
        let cooldown = Duration::from_millis(self.config.command_cooldown_ms);
        if let Some(last) = self.last_command_at {
            if now.saturating_duration_since(last) < cooldown {
                debug!("Command {} within cooldown, dropped", action.as_str());
                return Vec::new();
            }
        }
        self.last_command_at = Some(now);
        info!("Voice command: {}", action.as_str());
        vec![VoiceEvent::Command {
            action,
            utterance: utterance.to_string(),
        }]
    }

    fn dictate(&mut self, text: &str, now: Instant) -> Vec<VoiceEvent> {
        let (spoken, done) = split_done_phrase(text, &self.config.done_phrases);
        let VoiceMode::Field(session) = &mut self.mode else {
            return Vec::new();
        };
        session.interim = None;

        let mut events = Vec::new();
        if !spoken.is_empty() {
            if !session.accumulated.is_empty() {
                session.accumulated.push(' ');
            }
            session.accumulated.push_str(spoken);
            events.push(VoiceEvent::FieldValue {
                field: session.field.clone(),
                value: session.accumulated.clone(),
            });
        }

        if done {
            events.extend(self.finish_dictation(DictationReason::DonePhrase));
        } else {
            self.arm_silence(now);
        }
        events
    }

    fn arm_silence(&mut self, now: Instant) {
        if let Some(id) = self.silence_task.take() {
            self.scheduler.cancel(id);
        }
        let id = self.scheduler.schedule_in(
            now,
            Duration::from_millis(self.config.silence_timeout_ms),
            VoiceTask::Silence,
        );
        self.silence_task = Some(id);
    }

    fn clear_timers(&mut self) {
        self.scheduler.cancel_all();
        self.silence_task = None;
    }

    /// Run due timers.
    pub fn tick(&mut self, now: Instant) -> Vec<VoiceEvent> {
        let mut events = Vec::new();
        for task in self.scheduler.pop_due(now) {
            match task {
                VoiceTask::Silence => {
                    self.silence_task = None;
                    debug!("Dictation silence timeout");
                    events.extend(self.finish_dictation(DictationReason::Silence));
                }
            }
        }
        events
    }

    // ── Mode switching ──────────────────────────────────────

    /// Start dictating into `field`. A different active field is left
    /// first according to `previous`; its exit events come before this
    /// field's `FieldListening`. Re-entering the active field is a no-op.
    pub fn switch_to_field_mode(
        &mut self,
        field: &str,
        on_complete: OnComplete,
        previous: ExitPolicy,
        now: Instant,
    ) -> Vec<VoiceEvent> {
        if let VoiceMode::Field(active) = &self.mode {
            if active.field == field {
                return Vec::new();
            }
        }
        if !self.accepting_results() {
            warn!(
                "Cannot dictate into {}: listening is {}",
                field,
                self.supervisor.status().as_str()
            );
            return match self.supervisor.status() {
                SessionStatus::Failed(reason) => vec![VoiceEvent::ChannelUnavailable {
                    reason: reason.clone(),
                }],
                _ => Vec::new(),
            };
        }

        let mut events = match previous {
            ExitPolicy::Flush => self.finish_dictation(DictationReason::Superseded),
            ExitPolicy::Discard => self.leave_field(),
        };

        self.clear_timers();
        self.mode = VoiceMode::Field(FieldSession {
            field: field.to_string(),
            on_complete,
            accumulated: String::new(),
            interim: None,
            started: now,
        });
        info!("Voice mode: field ({})", field);
        events.push(VoiceEvent::FieldListening {
            field: field.to_string(),
        });
        events
    }

    /// Leave field mode without running the completion.
    pub fn switch_to_global_mode(&mut self) -> Vec<VoiceEvent> {
        self.leave_field()
    }

    fn leave_field(&mut self) -> Vec<VoiceEvent> {
        self.clear_timers();
        match std::mem::replace(&mut self.mode, VoiceMode::Global) {
            VoiceMode::Global => Vec::new(),
            VoiceMode::Field(session) => {
                info!("Voice mode: global (left {})", session.field);
                vec![VoiceEvent::FieldExited {
                    field: session.field,
                    text: session.accumulated,
                }]
            }
        }
    }

    /// Complete the active dictation and return to global mode. The
    /// completion is reported at most once per field session.
    pub fn finish_dictation(&mut self, reason: DictationReason) -> Vec<VoiceEvent> {
        self.clear_timers();
        match std::mem::replace(&mut self.mode, VoiceMode::Global) {
            VoiceMode::Global => Vec::new(),
            VoiceMode::Field(session) => {
                info!(
                    "Dictation into {} finished ({}, {} chars)",
                    session.field,
                    reason.as_str(),
                    session.accumulated.len()
                );
                vec![VoiceEvent::DictationFinished {
                    field: session.field,
                    text: session.accumulated,
                    on_complete: session.on_complete,
                    reason,
                }]
            }
        }
    }

    // ── External coordination ───────────────────────────────

    /// Hand the recognizer to another consumer. Any dictation in progress
    /// is left without completion.
    pub fn pause_global_listening(&mut self) -> Vec<VoiceEvent> {
        if !self.supervisor.is_active() {
            return Vec::new();
        }
        let mut events = self.leave_field();
        self.supervisor.pause();
        self.source.abort();
        info!("Voice listening paused");
        events.push(VoiceEvent::ListeningPaused);
        events
    }

    /// Take the recognizer back and listen for commands again.
    pub fn resume_global_listening(&mut self) -> Vec<VoiceEvent> {
        if !self.supervisor.is_paused() {
            return Vec::new();
        }
        self.mode = VoiceMode::Global;
        match self.source.start() {
            Ok(()) => {
                self.supervisor.mark_active();
                info!("Voice listening resumed");
                vec![VoiceEvent::ListeningResumed]
            }
            Err(e) => self.channel_failed(format!("resume failed: {:#}", e)),
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn mode(&self) -> &VoiceMode {
        &self.mode
    }

    pub fn active_field(&self) -> Option<&str> {
        match &self.mode {
            VoiceMode::Field(s) => Some(s.field.as_str()),
            VoiceMode::Global => None,
        }
    }

    pub fn status(&self) -> &SessionStatus {
        self.supervisor.status()
    }

    pub fn supervisor(&self) -> &RecognitionSupervisor {
        &self.supervisor
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }
}

/// Split an utterance at the first done phrase. Returns the text spoken
/// before it (trimmed) and whether a done phrase was found.
fn split_done_phrase<'a>(text: &'a str, phrases: &[String]) -> (&'a str, bool) {
    let lowered = text.to_ascii_lowercase();
    let hit = phrases
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|p| lowered.find(&p.to_ascii_lowercase()))
        .min();
    match hit {
        Some(idx) => (text[..idx].trim(), true),
        None => (text, false),
    }
}
