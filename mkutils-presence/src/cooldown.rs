use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const TICKS_PER_SECOND: i64 = 20;
pub const MILLIS_PER_TICK: i64 = 50;

/// Placeholder replaced by the remaining seconds in the cooldown message.
pub const TIME_PLACEHOLDER: &str = "%time";

const DEFAULT_MESSAGE: &str = "§cPlease wait §e%times §cto use this again.";

#[derive(Debug, Clone, Copy)]
struct Entry {
    started_at: i64,
    duration_ticks: i64,
}

impl Entry {
    fn remaining_ticks(&self, now: i64) -> i64 {
        let end = self.started_at + self.duration_ticks * MILLIS_PER_TICK;
        let left = end - now;
        if left <= 0 { 0 } else { left / MILLIS_PER_TICK }
    }
}

/// Outcome of `Cooldown::try_use`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownUse {
    /// The cooldown was started; go ahead.
    Ready,
    /// Still cooling down. `message` is what to tell the subject, if anything.
    Active {
        remaining_ticks: i64,
        message: Option<String>,
    },
}

/// Per-subject delay, measured in game ticks (20 ticks = 1 second).
///
/// Time is passed in as epoch milliseconds so callers control the clock.
#[derive(Debug)]
pub struct Cooldown {
    duration_ticks: i64,
    message: Option<String>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Cooldown {
    pub fn new(duration_ticks: i64) -> Self {
        Self {
            duration_ticks,
            message: Some(DEFAULT_MESSAGE.to_string()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Use `message` while on cooldown; `%time` becomes the remaining seconds.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn without_message(mut self) -> Self {
        self.message = None;
        self
    }

    pub fn duration_ticks(&self) -> i64 {
        self.duration_ticks
    }

    /// Start the cooldown for `subject`, or report the one still running.
    pub fn try_use(&self, subject: &str, now: i64) -> CooldownUse {
        let remaining_ticks = self.remaining_ticks(subject, now);
        if remaining_ticks > 0 {
            return CooldownUse::Active {
                remaining_ticks,
                message: self.render_message(remaining_ticks),
            };
        }
        self.set_on_cooldown(subject, now);
        CooldownUse::Ready
    }

    /// Start (or restart) the cooldown for `subject` at `now`.
    pub fn set_on_cooldown(&self, subject: &str, now: i64) {
        self.lock().insert(
            subject.to_string(),
            Entry {
                started_at: now,
                duration_ticks: self.duration_ticks,
            },
        );
    }

    pub fn stop(&self, subject: &str) {
        self.lock().remove(subject);
    }

    pub fn is_on_cooldown(&self, subject: &str, now: i64) -> bool {
        self.remaining_ticks(subject, now) > 0
    }

    /// Whole ticks left, 0 when not cooling down. Expired entries are dropped here.
    pub fn remaining_ticks(&self, subject: &str, now: i64) -> i64 {
        let mut entries = self.lock();
        let Some(entry) = entries.get(subject) else {
            return 0;
        };
        let remaining = entry.remaining_ticks(now);
        if remaining == 0 {
            entries.remove(subject);
        }
        remaining
    }

    /// Seconds shown to players: rounded up, and never 0 while a tick remains.
    pub fn remaining_seconds(&self, subject: &str, now: i64) -> i64 {
        self.remaining_ticks(subject, now) / TICKS_PER_SECOND + 1
    }

    /// The message to show while on cooldown. `None` when not cooling down or silenced.
    pub fn cooldown_message(&self, subject: &str, now: i64) -> Option<String> {
        let remaining_ticks = self.remaining_ticks(subject, now);
        if remaining_ticks == 0 {
            return None;
        }
        self.render_message(remaining_ticks)
    }

    fn render_message(&self, remaining_ticks: i64) -> Option<String> {
        let seconds = remaining_ticks / TICKS_PER_SECOND + 1;
        self.message
            .as_ref()
            .map(|message| message.replace(TIME_PLACEHOLDER, &seconds.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
