//! Reconnect backoff

use rand::Rng;
use std::time::Duration;

/// Jittered exponential backoff
///
/// The n-th consecutive delay is drawn from `[base/2, base]` where
/// `base = min(cap, floor * 2^n)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap: cap.max(floor),
            attempts: 0,
        }
    }

    /// Upper bound of the next delay
    pub fn base(&self) -> Duration {
        let factor = 1u32 << self.attempts.min(31);
        self.floor.saturating_mul(factor).min(self.cap)
    }

    /// Draw the next delay and count the attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base();
        self.attempts = self.attempts.saturating_add(1);

        let half = base / 2;
        let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(jitter_ms)
    }

    /// Back to the floor after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
