//! Cancellable deferred tasks.
//!
//! Each waiting state machine (calibration, tour, dictation silence) owns
//! one `Scheduler` parameterized over its own task enum. Nothing here runs
//! on its own: the owner calls `pop_due(now)` from its `tick` and reacts to
//! whatever came due. Clearing the scheduler on a phase transition is what
//! guarantees that a superseded timer can never fire.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Deadline-ordered task queue.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    queue: BTreeMap<(Instant, u64), T>,
    deadlines: HashMap<u64, Instant>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Schedule `task` to come due at `at`.
    pub fn schedule_at(&mut self, at: Instant, task: T) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert((at, id), task);
        self.deadlines.insert(id, at);
        TaskId(id)
    }

    /// Schedule `task` to come due `delay` after `now`.
    pub fn schedule_in(&mut self, now: Instant, delay: Duration, task: T) -> TaskId {
        self.schedule_at(now + delay, task)
    }

    /// Cancel a pending task. Returns the task if it had not fired yet.
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        let at = self.deadlines.remove(&id.0)?;
        self.queue.remove(&(at, id.0))
    }

    /// Drop every pending task.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }

    /// Remove and return every task whose deadline is at or before `now`,
    /// earliest first. Tasks sharing a deadline come out in the order they
    /// were scheduled.
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            let (at, id) = *entry.key();
            if at > now {
                break;
            }
            due.push(entry.remove());
            self.deadlines.remove(&id);
        }
        due
    }

    /// Remove the earliest task due at or before `now`, with its deadline.
    ///
    /// Owners that schedule follow-up work from inside a handler loop on
    /// this and use the returned deadline as the base for the follow-up,
    /// so a late `tick` catches up without drifting the cadence.
    pub fn pop_next_due(&mut self, now: Instant) -> Option<(Instant, T)> {
        let entry = self.queue.first_entry()?;
        let (at, id) = *entry.key();
        if at > now {
            return None;
        }
        let task = entry.remove();
        self.deadlines.remove(&id);
        Some((at, task))
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
