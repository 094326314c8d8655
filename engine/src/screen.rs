//! Screen coordination: the live set of dwell targets for the visible view.
//!
//! A screen is described by a `ScreenLayout` (buttons and dictation field
//! wrappers with their rects). Showing a screen replaces the whole target
//! set; nothing is patched in place, so a target from the previous view can
//! never fire against the new one.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::dwell::{Activation, DwellConfig, DwellPreset, DwellSet, DwellTarget};
use crate::error::{EngineError, Result};
use crate::geometry::{Point, Rect};
use crate::voice::{CommandAction, ExitPolicy, OnComplete};

// ── Layout description ──────────────────────────────────────

/// A dwell-activatable button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub id: String,
    pub rect: Rect,
    /// Screen action name passed to the action sink.
    pub action: String,
    #[serde(default)]
    pub preset: Option<DwellPreset>,
    /// Overrides `preset` when set.
    #[serde(default)]
    pub dwell_ms: Option<u64>,
    #[serde(default)]
    pub padding_px: Option<f64>,
    /// Re-arm right after firing (next/previous style controls that stay
    /// on screen). Other buttons fire once per screen visit.
    #[serde(default)]
    pub repeatable: bool,
}

/// A text field that accepts dictation when its wrapper is dwelt on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub rect: Rect,
    #[serde(default)]
    pub on_complete: OnComplete,
    /// What happens to another field that is dictating when this one opens.
    #[serde(default)]
    pub exit_previous: ExitPolicy,
    #[serde(default)]
    pub dwell_ms: Option<u64>,
    #[serde(default)]
    pub padding_px: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenLayout {
    pub name: String,
    #[serde(default)]
    pub buttons: Vec<ButtonSpec>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl ScreenLayout {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            buttons: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_button(mut self, id: &str, rect: Rect, action: &str) -> Self {
        self.buttons.push(ButtonSpec {
            id: id.to_string(),
            rect,
            action: action.to_string(),
            preset: None,
            dwell_ms: None,
            padding_px: None,
            repeatable: false,
        });
        self
    }

    pub fn with_field(mut self, id: &str, rect: Rect, on_complete: OnComplete) -> Self {
        self.fields.push(FieldSpec {
            id: id.to_string(),
            rect,
            on_complete,
            exit_previous: ExitPolicy::default(),
            dwell_ms: None,
            padding_px: None,
        });
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let layout: Self = serde_json::from_str(text).map_err(|source| EngineError::Json {
            what: "screen layout".to_string(),
            source,
        })?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Store {
            path: path.to_path_buf(),
            source,
        })?;
        let layout: Self = serde_json::from_str(&text).map_err(|source| EngineError::Json {
            what: path.display().to_string(),
            source,
        })?;
        layout.validate()?;
        Ok(layout)
    }

    /// Buttons and fields share one id namespace on a screen.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.target_ids() {
            if !seen.insert(id) {
                return Err(EngineError::Config(format!(
                    "screen {}: duplicate target id '{}'",
                    self.name, id
                )));
            }
        }
        Ok(())
    }

    fn target_ids(&self) -> impl Iterator<Item = &str> {
        self.buttons
            .iter()
            .map(|b| b.id.as_str())
            .chain(self.fields.iter().map(|f| f.id.as_str()))
    }
}

// ── Targets and actions ─────────────────────────────────────

/// What a screen target does when its dwell completes.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenTarget {
    Button { action: String, repeatable: bool },
    Field {
        field: String,
        on_complete: OnComplete,
        exit_previous: ExitPolicy,
    },
}

/// A UI action for the host application to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    /// A dwell button fired.
    Button { screen: String, id: String, action: String },
    /// A global voice command the engine does not handle itself.
    Command(CommandAction),
    /// Write dictated text into a field.
    SetFieldValue { field: String, value: String },
    /// Dictation finished with `OnComplete::Submit`.
    Submit { field: String, text: String },
    /// Dictation finished with `OnComplete::Action`.
    Run { action: String, field: String, text: String },
}

/// Performs UI actions on behalf of the engine. Errors are logged by the
/// caller and never stop the engine.
pub trait ActionSink {
    fn perform(&mut self, action: &UiAction) -> anyhow::Result<()>;
}

/// Sink that keeps every action, for tests and script replay.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub actions: Vec<UiAction>,
    /// Fail every action whose button or command name equals this.
    pub fail_on: Option<String>,
}

impl ActionSink for RecordingSink {
    fn perform(&mut self, action: &UiAction) -> anyhow::Result<()> {
        self.actions.push(action.clone());
        let name = match action {
            UiAction::Button { action, .. } => Some(action.as_str()),
            UiAction::Command(c) => Some(c.as_str()),
            _ => None,
        };
        if let (Some(name), Some(fail)) = (name, self.fail_on.as_deref()) {
            if name == fail {
                anyhow::bail!("action {} failed", name);
            }
        }
        Ok(())
    }
}

/// Sink that only logs, for running without a host UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ActionSink for LoggingSink {
    fn perform(&mut self, action: &UiAction) -> anyhow::Result<()> {
        info!("UI action: {:?}", action);
        Ok(())
    }
}

// ── Coordinator ─────────────────────────────────────────────

/// Owns the visible screen's dwell targets.
#[derive(Debug, Default)]
pub struct ScreenCoordinator {
    defaults: DwellConfig,
    screen: Option<String>,
    targets: DwellSet<ScreenTarget>,
    generation: u64,
}

impl ScreenCoordinator {
    pub fn new(defaults: DwellConfig) -> Self {
        Self {
            defaults,
            ..Default::default()
        }
    }

    /// Replace the target set with `layout`'s. Every old target is reset
    /// first so none of their pending deadlines survive.
    pub fn show(&mut self, layout: &ScreenLayout) {
        self.targets.reset_all();
        let default_dwell = Duration::from_millis(self.defaults.default_dwell_ms);
        let gap = Duration::from_millis(self.defaults.max_sample_gap_ms);

        let mut targets: Vec<DwellTarget<ScreenTarget>> =
            Vec::with_capacity(layout.buttons.len() + layout.fields.len());
        for b in &layout.buttons {
            if targets.iter().any(|t| t.id == b.id) {
                warn!("Screen {}: ignoring duplicate target id {}", layout.name, b.id);
                continue;
            }
            let dwell = match (b.dwell_ms, b.preset) {
                (Some(ms), _) => Duration::from_millis(ms),
                (None, Some(p)) => p.duration(),
                (None, None) => default_dwell,
            };
            targets.push(
                DwellTarget::new(
                    b.id.clone(),
                    b.rect,
                    dwell,
                    ScreenTarget::Button {
                        action: b.action.clone(),
                        repeatable: b.repeatable,
                    },
                )
                .with_padding(b.padding_px.unwrap_or(self.defaults.default_padding_px))
                .with_max_sample_gap(gap),
            );
        }
        for f in &layout.fields {
            if targets.iter().any(|t| t.id == f.id) {
                warn!("Screen {}: ignoring duplicate target id {}", layout.name, f.id);
                continue;
            }
            let dwell = f.dwell_ms.map(Duration::from_millis).unwrap_or(default_dwell);
            targets.push(
                DwellTarget::new(
                    f.id.clone(),
                    f.rect,
                    dwell,
                    ScreenTarget::Field {
                        field: f.id.clone(),
                        on_complete: f.on_complete.clone(),
                        exit_previous: f.exit_previous,
                    },
                )
                .with_padding(f.padding_px.unwrap_or(self.defaults.default_padding_px))
                .with_max_sample_gap(gap),
            );
        }

        let count = targets.len();
        self.targets = DwellSet::new(targets);
        self.screen = Some(layout.name.clone());
        self.generation += 1;
        info!(
            "Screen {} shown: {} buttons, {} fields ({} targets)",
            layout.name,
            layout.buttons.len(),
            layout.fields.len(),
            count
        );
    }

    /// Drop every target (modal covering the page, calibration overlay).
    pub fn clear(&mut self) {
        self.targets.reset_all();
        self.targets = DwellSet::default();
        self.screen = None;
        self.generation += 1;
        debug!("Screen targets cleared");
    }

    pub fn update(&mut self, point: Point, now: Instant) -> Vec<Activation<ScreenTarget>> {
        self.targets.update_all(point, now)
    }

    pub fn tick(&mut self, now: Instant) -> Vec<Activation<ScreenTarget>> {
        self.targets.tick_all(now)
    }

    /// Re-arm one target after its action ran.
    pub fn rearm(&mut self, id: &str) -> bool {
        self.targets.reset(id)
    }

    pub fn rearm_all(&mut self) {
        self.targets.reset_all();
    }

    /// Re-arm field wrappers left activated by a refused dictation.
    pub fn rearm_fields(&mut self) -> usize {
        self.targets.reset_where(|t| {
            t.is_activated() && matches!(t.action, ScreenTarget::Field { .. })
        })
    }

    pub fn centers(&self) -> Vec<Point> {
        self.targets.centers()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.targets.next_deadline()
    }

    pub fn progress(&self, id: &str, now: Instant) -> Option<f64> {
        self.targets.get(id).map(|t| t.progress(now))
    }

    pub fn screen(&self) -> Option<&str> {
        self.screen.as_deref()
    }

    /// Incremented on every `show` or `clear`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn targets(&self) -> &DwellSet<ScreenTarget> {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    fn home() -> ScreenLayout {
        ScreenLayout::new("home")
            .with_button("flashcards", Rect::new(100.0, 100.0, 300.0, 160.0), "open-flashcards")
            .with_field("search", Rect::new(100.0, 600.0, 700.0, 650.0), OnComplete::Submit)
    }

    #[test]
    fn test_show_builds_targets() {
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&home());
        assert_eq!(sc.screen(), Some("home"));
        assert_eq!(sc.targets().len(), 2);
        assert_eq!(sc.centers()[0], Point::new(200.0, 130.0));
    }

    #[test]
    fn test_replacing_screen_drops_pending_dwell() {
        let t0 = Instant::now();
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&home());
        for step in 0..=14 {
            assert!(sc.update(Point::new(200.0, 130.0), ms(t0, step * 100)).is_empty());
        }
        assert_eq!(sc.next_deadline(), Some(ms(t0, 1500)));

        sc.show(&ScreenLayout::new("quiz"));
        assert!(sc.next_deadline().is_none());
        assert!(sc.tick(ms(t0, 5000)).is_empty());
        assert_eq!(sc.generation(), 2);
    }

    #[test]
    fn test_button_dwell_override_and_preset() {
        let mut layout = ScreenLayout::new("list");
        layout.buttons.push(ButtonSpec {
            id: "delete".into(),
            rect: Rect::new(0.0, 0.0, 50.0, 50.0),
            action: "delete-deck".into(),
            preset: Some(DwellPreset::Destructive),
            dwell_ms: None,
            padding_px: Some(10.0),
            repeatable: false,
        });
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&layout);
        let t = sc.targets().get("delete").unwrap();
        assert_eq!(t.dwell, Duration::from_millis(2000));
        assert_eq!(t.padding, 10.0);
    }

    #[test]
    fn test_field_activation_carries_completion() {
        let t0 = Instant::now();
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&home());
        let p = Point::new(400.0, 625.0);
        let mut fired = Vec::new();
        let mut t = 0;
        while t <= 1600 {
            fired.extend(sc.update(p, ms(t0, t)));
            t += 50;
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(
            fired[0].action,
            ScreenTarget::Field {
                field: "search".into(),
                on_complete: OnComplete::Submit,
                exit_previous: ExitPolicy::Discard,
            }
        );
    }

    #[test]
    fn test_layout_json() {
        let json = r#"{
            "name": "practice",
            "buttons": [
                {"id": "next", "rect": {"left": 0, "top": 0, "right": 100, "bottom": 40},
                 "action": "next-card", "preset": "quick", "repeatable": true}
            ],
            "fields": [
                {"id": "answer", "rect": {"left": 0, "top": 100, "right": 400, "bottom": 140},
                 "on_complete": "submit", "exit_previous": "flush"}
            ]
        }"#;
        let layout = ScreenLayout::from_json(json).unwrap();
        assert_eq!(layout.buttons[0].preset, Some(DwellPreset::Quick));
        assert!(layout.buttons[0].repeatable);
        assert_eq!(layout.fields[0].on_complete, OnComplete::Submit);
        assert_eq!(layout.fields[0].exit_previous, ExitPolicy::Flush);

        assert!(matches!(
            ScreenLayout::from_json("{\"buttons\": []}"),
            Err(EngineError::Json { .. })
        ));
    }

    #[test]
    fn test_layout_rejects_shared_ids() {
        let json = r#"{
            "name": "practice",
            "buttons": [
                {"id": "answer", "rect": {"left": 0, "top": 0, "right": 100, "bottom": 40},
                 "action": "reveal"}
            ],
            "fields": [
                {"id": "answer", "rect": {"left": 0, "top": 100, "right": 400, "bottom": 140}}
            ]
        }"#;
        let err = ScreenLayout::from_json(json).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("answer"));

        let twice = ScreenLayout::new("list")
            .with_button("go", Rect::new(0.0, 0.0, 10.0, 10.0), "a")
            .with_button("go", Rect::new(20.0, 0.0, 30.0, 10.0), "b");
        assert!(twice.validate().is_err());
        assert!(home().validate().is_ok());
    }

    #[test]
    fn test_show_keeps_first_of_duplicate_ids() {
        let t0 = Instant::now();
        let layout = ScreenLayout::new("practice")
            .with_button("answer", Rect::new(0.0, 0.0, 100.0, 40.0), "reveal")
            .with_field("answer", Rect::new(0.0, 300.0, 400.0, 340.0), OnComplete::Submit);
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&layout);
        assert_eq!(sc.targets().len(), 1);

        let mut fired = Vec::new();
        for step in 0..=16 {
            fired.extend(sc.update(Point::new(50.0, 20.0), ms(t0, step * 100)));
        }
        assert_eq!(fired.len(), 1);
        assert!(sc.rearm("answer"));
        assert!(!sc.targets().get("answer").unwrap().is_activated());
    }

    #[test]
    fn test_rearm_fields_leaves_buttons_activated() {
        let t0 = Instant::now();
        let layout = home().with_button(
            "wide",
            Rect::new(100.0, 600.0, 700.0, 650.0),
            "wide-action",
        );
        let mut sc = ScreenCoordinator::new(DwellConfig::default());
        sc.show(&layout);
        let mut fired = Vec::new();
        for step in 0..=16 {
            fired.extend(sc.update(Point::new(400.0, 625.0), ms(t0, step * 100)));
        }
        assert_eq!(fired.len(), 2);

        assert_eq!(sc.rearm_fields(), 1);
        assert!(!sc.targets().get("search").unwrap().is_activated());
        assert!(sc.targets().get("wide").unwrap().is_activated());
        assert_eq!(sc.rearm_fields(), 0);
    }

    #[test]
    fn test_recording_sink_failure() {
        let mut sink = RecordingSink {
            fail_on: Some("boom".into()),
            ..Default::default()
        };
        let ok = UiAction::Button {
            screen: "s".into(),
            id: "a".into(),
            action: "fine".into(),
        };
        let bad = UiAction::Button {
            screen: "s".into(),
            id: "b".into(),
            action: "boom".into(),
        };
        assert!(sink.perform(&ok).is_ok());
        assert!(sink.perform(&bad).is_err());
        assert_eq!(sink.actions.len(), 2);
    }
}
