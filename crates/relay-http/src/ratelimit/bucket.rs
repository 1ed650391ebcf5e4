//! Per-route rate-limit bucket

use std::time::Duration;

use tokio::time::Instant;

use super::RateLimitHeaders;

/// Remaining request budget for one bucket key
///
/// `remaining` is `None` until a response has told us the limit; such a
/// bucket sends optimistically.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub key: String,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<Instant>,
    /// Platform bucket hash from `x-ratelimit-bucket`
    pub bucket_id: Option<String>,
}

impl RateLimitBucket {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            limit: None,
            remaining: None,
            reset_at: None,
            bucket_id: None,
        }
    }

    /// Whether any response has populated this bucket yet
    pub fn is_known(&self) -> bool {
        self.remaining.is_some()
    }

    /// How long to wait before the next request may be sent
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at - now),
            _ => None,
        }
    }

    /// Account for a request about to be sent
    ///
    /// Refills the budget once the reset time has passed, then takes one.
    pub fn take(&mut self, now: Instant) {
        if self.reset_at.is_some_and(|reset_at| reset_at <= now) {
            self.remaining = self.limit;
            self.reset_at = None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Apply the rate-limit headers of a response
    pub fn update(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = Some(remaining);
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(now + reset_after);
        }
        if let Some(bucket) = &headers.bucket {
            self.bucket_id = Some(bucket.clone());
        }
    }

    /// Exhaust the bucket until `now + duration` after a bucket-scoped 429
    pub fn exhaust_for(&mut self, duration: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(now + duration);
    }
}
