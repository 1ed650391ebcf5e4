//! Process-wide rate limit

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Global lock set by a global 429, checked before every send
#[derive(Debug, Default)]
pub struct GlobalRateLimit {
    locked_until: Mutex<Option<Instant>>,
}

impl GlobalRateLimit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for `duration` from now; never shortens an existing lock
    pub fn lock_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut locked = self.locked_until.lock();
        if !locked.is_some_and(|current| current >= until) {
            *locked = Some(until);
        }
    }

    /// Remaining lock time, clearing an expired lock
    pub fn wait_time(&self) -> Option<Duration> {
        let mut locked = self.locked_until.lock();
        let until = (*locked)?;
        let now = Instant::now();
        if until > now {
            Some(until - now)
        } else {
            *locked = None;
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.wait_time().is_some()
    }
}
