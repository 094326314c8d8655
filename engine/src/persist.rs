//! Flags that survive restarts: "gaze calibrated" and "tour completed".
//!
//! Only these two facts persist. The trainer's regression itself lives in
//! the external estimator; a fresh process re-reads the flags and decides
//! whether to run calibration and the tour again.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Persisted interaction state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedFlags {
    pub gaze_calibrated: bool,
    pub tour_completed: bool,
    /// Wall-clock millis of the last completed or skipped calibration.
    pub calibrated_at_ms: Option<i64>,
}

/// Where persisted flags live.
pub trait FlagStore {
    fn load(&self) -> Result<PersistedFlags>;
    fn save(&mut self, flags: &PersistedFlags) -> Result<()>;
}

// ── Memory ──────────────────────────────────────────────────

/// Process-local store, for tests and for running without a state file.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    flags: PersistedFlags,
    pub saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: PersistedFlags) -> Self {
        Self { flags, saves: 0 }
    }

    pub fn flags(&self) -> &PersistedFlags {
        &self.flags
    }
}

impl FlagStore for MemoryStore {
    fn load(&self) -> Result<PersistedFlags> {
        Ok(self.flags.clone())
    }

    fn save(&mut self, flags: &PersistedFlags) -> Result<()> {
        self.flags = flags.clone();
        self.saves += 1;
        Ok(())
    }
}

// ── JSON file ───────────────────────────────────────────────

/// JSON file store. A missing file reads as defaults; writes go through a
/// sibling temp file and a rename so a crash never leaves half a file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> EngineError {
        EngineError::Store {
            path: self.path.clone(),
            source,
        }
    }
}

impl FlagStore for JsonFileStore {
    fn load(&self) -> Result<PersistedFlags> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted state at {}, using defaults", self.path.display());
                return Ok(PersistedFlags::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&text).map_err(|source| EngineError::Json {
            what: self.path.display().to_string(),
            source,
        })
    }

    fn save(&mut self, flags: &PersistedFlags) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
            }
        }
        let json = serde_json::to_string_pretty(flags).map_err(|source| EngineError::Json {
            what: "persisted flags".to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            f.write_all(json.as_bytes()).map_err(|e| self.io_err(e))?;
            f.sync_all().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

// ── Persisted state handle ──────────────────────────────────

/// In-memory copy of the flags plus the store that backs them. Mutations
/// go through named operations and are written through immediately.
#[derive(Debug)]
pub struct PersistedState<F: FlagStore> {
    flags: PersistedFlags,
    store: F,
}

impl<F: FlagStore> PersistedState<F> {
    /// Load from `store`; an unreadable store degrades to defaults so a
    /// corrupt file cannot lock the user out of the app.
    pub fn open(store: F) -> Self {
        let flags = match store.load() {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to load persisted flags, using defaults: {}", e);
                PersistedFlags::default()
            }
        };
        info!(
            "Persisted state: calibrated={} tour_completed={}",
            flags.gaze_calibrated, flags.tour_completed
        );
        Self { flags, store }
    }

    pub fn flags(&self) -> &PersistedFlags {
        &self.flags
    }

    pub fn store(&self) -> &F {
        &self.store
    }

    pub fn is_calibrated(&self) -> bool {
        self.flags.gaze_calibrated
    }

    pub fn tour_completed(&self) -> bool {
        self.flags.tour_completed
    }

    pub fn mark_calibrated(&mut self, at_ms: i64) {
        self.flags.gaze_calibrated = true;
        self.flags.calibrated_at_ms = Some(at_ms);
        self.flush();
    }

    /// Explicit recalibration clears the flag until the protocol finishes.
    pub fn clear_calibrated(&mut self) {
        self.flags.gaze_calibrated = false;
        self.flush();
    }

    pub fn mark_tour_completed(&mut self) {
        self.flags.tour_completed = true;
        self.flush();
    }

    /// Forget everything (test-reset operation).
    pub fn reset_all(&mut self) {
        self.flags = PersistedFlags::default();
        self.flush();
    }

    fn flush(&mut self) {
        if let Err(e) = self.store.save(&self.flags) {
            warn!("Failed to persist flags: {}", e);
        }
    }
}
