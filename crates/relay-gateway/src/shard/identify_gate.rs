//! Identify rate limiting
//!
//! The platform allows `max_concurrency` identifies per `identify_interval`.
//! Shard `n` belongs to bucket `n % max_concurrency`; each bucket lets one
//! identify through per interval.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces identify handshakes per concurrency bucket
#[derive(Debug)]
pub struct IdentifyGate {
    interval: Duration,
    buckets: Vec<Mutex<Option<Instant>>>,
}

impl IdentifyGate {
    pub fn new(max_concurrency: u32, interval: Duration) -> Self {
        let buckets = (0..max_concurrency.max(1)).map(|_| Mutex::new(None)).collect();
        Self { interval, buckets }
    }

    pub fn max_concurrency(&self) -> u32 {
        self.buckets.len() as u32
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Bucket a shard identifies through
    pub fn bucket_of(&self, shard_id: u32) -> usize {
        shard_id as usize % self.buckets.len()
    }

    /// Wait for this shard's identify slot
    ///
    /// Callers are served one at a time per bucket. Returns once at least
    /// `interval` has passed since the bucket's previous identify. Dropping the
    /// future gives up the slot without consuming it.
    pub async fn wait(&self, shard_id: u32) {
        let bucket = self.bucket_of(shard_id);
        let mut last = self.buckets[bucket].lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    shard_id,
                    bucket,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Waiting for identify slot"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
