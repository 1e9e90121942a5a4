//! Per-command cooldown windows.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::CommandSpec;

/// Last successful invocation per trigger.
///
/// Lives for one session epoch. A reload builds a new tracker, which is how
/// cooldowns are cleared.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_run: HashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `command` must not run again at `now`.
    pub fn in_cooldown(&self, command: &CommandSpec, now: DateTime<Utc>) -> bool {
        if command.cooldown_secs <= 0 {
            return false;
        }

        let Some(last) = self.last_run.get(&command.trigger) else {
            return false;
        };
        // A deadline past chrono's range never arrives.
        match TimeDelta::try_seconds(command.cooldown_secs).and_then(|d| last.checked_add_signed(d)) {
            Some(until) => until > now,
            None => true,
        }
    }

    /// Start a new window for `command` at `now`.
    pub fn record(&mut self, command: &CommandSpec, now: DateTime<Utc>) {
        self.last_run.insert(command.trigger.clone(), now);
    }
}
