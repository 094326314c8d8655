//! Time sources.
//!
//! Every state machine in this crate takes `now: Instant` as an argument
//! and never reads a clock itself. The runtime loop reads `now()` from a
//! `Clock`, and the engine reads `unix_millis()` only to timestamp the
//! persisted calibration flag. `SystemClock` is real time; `TestClock`
//! only moves when a test or a scripted replay says so.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the UNIX epoch (used for persisted
    /// calibration timestamps).
    fn unix_millis(&self) -> i64;
}

fn system_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        system_unix_millis()
    }
}

/// Manually advanced clock for tests and scripted replays.
///
/// Wall time is derived from the monotonic offset, so sub-millisecond
/// advances never accumulate rounding drift.
#[derive(Debug)]
pub struct TestClock {
    state: Mutex<TestClockState>,
}

#[derive(Debug, Clone, Copy)]
struct TestClockState {
    origin: Instant,
    origin_unix_ms: i64,
    now: Instant,
}

impl TestClockState {
    fn unix_millis(&self) -> i64 {
        self.origin_unix_ms + self.now.saturating_duration_since(self.origin).as_millis() as i64
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    /// Start at the current real time; from here on time is frozen.
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            state: Mutex::new(TestClockState {
                origin,
                origin_unix_ms: system_unix_millis(),
                now: origin,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TestClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.state().now += by;
    }

    /// Move time forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Pin the wall-clock reading at the current instant.
    pub fn set_unix_millis(&self, ms: i64) {
        let mut state = self.state();
        state.origin = state.now;
        state.origin_unix_ms = ms;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.state().now
    }

    fn unix_millis(&self) -> i64 {
        self.state().unix_millis()
    }
}
