//! Request dispatcher
//!
//! Every request goes through the bucket for its route key. The bucket's
//! async mutex is held across the wait, the send and the header update, so
//! concurrent callers of one bucket always see each other's accounting.
//! Different buckets never wait on each other except through the global lock.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relay_common::HttpConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::HttpError;
use crate::models::GatewayBotInfo;
use crate::ratelimit::{GlobalRateLimit, RateLimitBucket, RateLimitHeaders};
use crate::route::Route;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Retry policy
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 429 retries before `RateLimited` is returned
    pub max_rate_limit_retries: u32,
    /// 5xx retries before `Status` is returned
    pub max_server_retries: u32,
    pub server_backoff_floor: Duration,
    pub server_backoff_cap: Duration,
    /// Tracked buckets before idle ones are dropped
    pub prune_threshold: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_server_retries: 3,
            server_backoff_floor: Duration::from_millis(500),
            server_backoff_cap: Duration::from_secs(8),
            prune_threshold: 1024,
        }
    }
}

impl From<&HttpConfig> for DispatcherConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_rate_limit_retries: config.max_rate_limit_retries,
            max_server_retries: config.max_server_retries,
            ..Self::default()
        }
    }
}

/// Rate-limited request dispatcher
pub struct RequestDispatcher {
    transport: Arc<dyn HttpTransport>,
    buckets: DashMap<String, Arc<Mutex<RateLimitBucket>>>,
    global: GlobalRateLimit,
    config: DispatcherConfig,
    shutdown: watch::Sender<bool>,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &HttpConfig) -> Self {
        Self::with_config(transport, DispatcherConfig::from(config))
    }

    pub fn with_config(transport: Arc<dyn HttpTransport>, config: DispatcherConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            buckets: DashMap::new(),
            global: GlobalRateLimit::new(),
            config,
            shutdown,
        }
    }

    /// Send a request, waiting out rate limits and retrying 429 and 5xx
    pub async fn send(&self, route: &Route, body: Option<Value>) -> Result<HttpResponse, HttpError> {
        if self.is_shut_down() {
            return Err(HttpError::Cancelled);
        }

        let key = route.bucket_key();
        let lock = self.bucket(&key);
        let mut bucket = self.cancellable(lock.lock()).await?;

        let mut rate_limit_retries = 0;
        let mut server_retries = 0;

        loop {
            self.wait_until_clear(&key, &bucket).await?;
            bucket.take(Instant::now());

            let request = HttpRequest {
                method: route.method().clone(),
                path: route.path().to_string(),
                body: body.clone(),
            };
            let response = self.cancellable(self.transport.execute(request)).await??;

            let now = Instant::now();
            bucket.update(&RateLimitHeaders::from_response(&response), now);

            if response.status == 429 {
                let (retry_after, global) = RateLimitHeaders::rate_limit_of(&response);
                if global {
                    self.global.lock_for(retry_after);
                } else {
                    bucket.exhaust_for(retry_after, now);
                }

                if rate_limit_retries >= self.config.max_rate_limit_retries {
                    tracing::warn!(bucket = %key, global, "Rate limit retries exhausted");
                    return Err(HttpError::RateLimited {
                        bucket: key,
                        retry_after,
                        global,
                    });
                }
                rate_limit_retries += 1;
                tracing::warn!(
                    bucket = %key,
                    retry_after_ms = retry_after.as_millis() as u64,
                    global,
                    attempt = rate_limit_retries,
                    "Rate limited, retrying"
                );
                continue;
            }

            if response.status >= 500 {
                if server_retries >= self.config.max_server_retries {
                    return Err(HttpError::Status {
                        status: response.status,
                        body: response.text(),
                    });
                }
                let delay = self.server_backoff(server_retries);
                server_retries += 1;
                tracing::warn!(
                    route = %route,
                    status = response.status,
                    delay_ms = delay.as_millis() as u64,
                    attempt = server_retries,
                    "Server error, retrying"
                );
                self.sleep(delay).await?;
                continue;
            }

            if response.is_success() {
                tracing::trace!(route = %route, status = response.status, "Request completed");
                return Ok(response);
            }

            return Err(HttpError::Status {
                status: response.status,
                body: response.text(),
            });
        }
    }

    /// Send a request and decode the JSON response
    pub async fn request<T: DeserializeOwned>(
        &self,
        route: &Route,
        body: Option<Value>,
    ) -> Result<T, HttpError> {
        self.send(route, body).await?.json()
    }

    /// Recommended shard count, gateway URL and identify concurrency
    pub async fn gateway_bot(&self) -> Result<GatewayBotInfo, HttpError> {
        self.request(&Route::gateway_bot(), None).await
    }

    /// Cancel every suspended wait and refuse new requests
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn global(&self) -> &GlobalRateLimit {
        &self.global
    }

    /// Copy of a bucket's current state
    pub async fn bucket_state(&self, key: &str) -> Option<RateLimitBucket> {
        let lock = self.buckets.get(key).map(|entry| Arc::clone(entry.value()))?;
        let bucket = lock.lock().await;
        Some(bucket.clone())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets nobody is using whose reset time has passed
    ///
    /// Returns how many were dropped. A dropped key starts over as an unknown
    /// bucket, which is what a passed reset amounts to anyway.
    pub fn prune_buckets(&self) -> usize {
        let before = self.buckets.len();
        let now = Instant::now();
        self.buckets.retain(|_, lock| {
            if Arc::strong_count(lock) > 1 {
                return true;
            }
            match lock.try_lock() {
                Ok(bucket) => bucket.reset_at.is_some_and(|reset_at| reset_at > now),
                Err(_) => true,
            }
        });
        let pruned = before.saturating_sub(self.buckets.len());
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.buckets.len(), "Pruned idle rate-limit buckets");
        }
        pruned
    }

    fn bucket(&self, key: &str) -> Arc<Mutex<RateLimitBucket>> {
        if self.buckets.len() >= self.config.prune_threshold && !self.buckets.contains_key(key) {
            self.prune_buckets();
        }
        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitBucket::new(key))));
        Arc::clone(entry.value())
    }

    /// Sleep until one pass finds both the global lock and the bucket clear
    ///
    /// A global 429 from another bucket can land while this one waits, so the
    /// global lock is checked again after every bucket wait.
    async fn wait_until_clear(&self, key: &str, bucket: &RateLimitBucket) -> Result<(), HttpError> {
        loop {
            if let Some(wait) = self.global.wait_time() {
                tracing::debug!(bucket = %key, wait_ms = wait.as_millis() as u64, "Waiting for global rate limit");
                self.sleep(wait).await?;
                continue;
            }
            match bucket.wait_time(Instant::now()) {
                Some(wait) => {
                    tracing::debug!(bucket = %key, wait_ms = wait.as_millis() as u64, "Bucket exhausted, waiting for reset");
                    self.sleep(wait).await?;
                }
                None => return Ok(()),
            }
        }
    }

    fn server_backoff(&self, attempt: u32) -> Duration {
        self.config
            .server_backoff_floor
            .saturating_mul(1 << attempt.min(16))
            .min(self.config.server_backoff_cap)
    }

    async fn sleep(&self, duration: Duration) -> Result<(), HttpError> {
        self.cancellable(tokio::time::sleep(duration)).await
    }

    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output, HttpError> {
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            output = future => Ok(output),
            _ = shutdown.wait_for(|stopped| *stopped) => Err(HttpError::Cancelled),
        }
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("buckets", &self.buckets.len())
            .field("global_locked", &self.global.is_locked())
            .field("shut_down", &self.is_shut_down())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use relay_core::Snowflake;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Handler = Box<dyn Fn(&HttpRequest, u32) -> Result<HttpResponse, TransportError> + Send + Sync>;

    /// Transport answering from a closure given the request and call index
    struct ScriptedTransport {
        handler: Handler,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new<F>(handler: F) -> Arc<Self>
        where
            F: Fn(&HttpRequest, u32) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                handler: Box::new(handler),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            (self.handler)(&request, index)
        }
    }

    fn dispatcher(transport: &Arc<ScriptedTransport>, config: DispatcherConfig) -> Arc<RequestDispatcher> {
        let transport: Arc<dyn HttpTransport> = transport.clone();
        Arc::new(RequestDispatcher::with_config(transport, config))
    }

    fn rate_limited(retry_after: f64, global: bool) -> HttpResponse {
        HttpResponse::new(429).with_json(&json!({
            "message": "You are being rate limited.",
            "retry_after": retry_after,
            "global": global
        }))
    }

    fn sf(id: u64) -> Snowflake {
        Snowflake::new(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let transport = ScriptedTransport::new(|request, _| {
            assert_eq!(request.path, "/channels/5");
            Ok(HttpResponse::new(200).with_json(&json!({"id": "5"})))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let body: Value = dispatcher
            .request(&Route::get_channel(sf(5)), None)
            .await
            .unwrap();
        assert_eq!(body["id"], "5");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_bucket_budget() {
        // Simulated server: 2 requests per 1s window, 429 beyond that
        let window = Arc::new(parking_lot::Mutex::new((Instant::now(), 0u32)));
        let rejected = Arc::new(AtomicU32::new(0));
        let transport = {
            let window = Arc::clone(&window);
            let rejected = Arc::clone(&rejected);
            ScriptedTransport::new(move |_, _| {
                let mut state = window.lock();
                let now = Instant::now();
                if now >= state.0 + Duration::from_secs(1) {
                    *state = (now, 0);
                }
                let reset_after = (state.0 + Duration::from_secs(1)) - now;
                if state.1 >= 2 {
                    rejected.fetch_add(1, Ordering::SeqCst);
                    return Ok(rate_limited(reset_after.as_secs_f64(), false));
                }
                state.1 += 1;
                Ok(HttpResponse::new(200)
                    .with_header("x-ratelimit-limit", 2)
                    .with_header("x-ratelimit-remaining", 2 - state.1)
                    .with_header("x-ratelimit-reset-after", reset_after.as_secs_f64()))
            })
        };
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        let route = Route::create_message(sf(1));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let dispatcher = Arc::clone(&dispatcher);
            let route = route.clone();
            handles.push(tokio::spawn(async move { dispatcher.send(&route, None).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(rejected.load(Ordering::SeqCst), 0);
        assert_eq!(transport.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(1));

        let bucket = dispatcher.bucket_state(&route.bucket_key()).await.unwrap();
        assert_eq!(bucket.limit, Some(2));
        assert_eq!(bucket.remaining, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_holds_next_caller() {
        let transport = ScriptedTransport::new(|_, index| {
            Ok(HttpResponse::new(200)
                .with_header("x-ratelimit-limit", 2)
                .with_header("x-ratelimit-remaining", 1 - index.min(1))
                .with_header("x-ratelimit-reset-after", 3))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        let route = Route::create_message(sf(1));
        let start = Instant::now();

        // budget 2: the second send goes straight out and empties the bucket
        dispatcher.send(&route, None).await.unwrap();
        dispatcher.send(&route, None).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        let bucket = dispatcher.bucket_state(&route.bucket_key()).await.unwrap();
        assert_eq!(bucket.remaining, Some(0));

        // the third waits for the reset announced by the second response
        dispatcher.send(&route, None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_lock_set_during_bucket_wait_is_honoured() {
        let sent = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let transport = {
            let sent = Arc::clone(&sent);
            ScriptedTransport::new(move |request, _| {
                sent.lock().push((request.path.clone(), Instant::now()));
                if request.path == "/channels/2/messages" {
                    return Ok(rate_limited(10.0, true));
                }
                Ok(HttpResponse::new(200)
                    .with_header("x-ratelimit-limit", 1)
                    .with_header("x-ratelimit-remaining", 0)
                    .with_header("x-ratelimit-reset-after", 2))
            })
        };
        let config = DispatcherConfig {
            max_rate_limit_retries: 0,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(&transport, config);
        let a = Route::create_message(sf(1));
        let start = Instant::now();

        dispatcher.send(&a, None).await.unwrap();
        let queued = {
            let dispatcher = Arc::clone(&dispatcher);
            let a = a.clone();
            tokio::spawn(async move { dispatcher.send(&a, None).await })
        };

        // bucket A resets at 2s; a global 429 at 1s locks everything until 11s
        tokio::time::sleep(Duration::from_secs(1)).await;
        let err = dispatcher
            .send(&Route::create_message(sf(2)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::RateLimited { global: true, .. }));

        queued.await.unwrap().unwrap();
        let sent = sent.lock();
        let (path, at) = sent.last().unwrap();
        assert_eq!(path, "/channels/1/messages");
        assert!(*at - start >= Duration::from_secs(11), "sent at {:?}", *at - start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_buckets_are_pruned() {
        let transport = ScriptedTransport::new(|request, _| {
            if request.path == "/channels/1/messages" {
                return Ok(HttpResponse::new(200)
                    .with_header("x-ratelimit-limit", 5)
                    .with_header("x-ratelimit-remaining", 4)
                    .with_header("x-ratelimit-reset-after", 10));
            }
            Ok(HttpResponse::new(200))
        });
        let config = DispatcherConfig {
            prune_threshold: 2,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(&transport, config);
        let (one, two, three) = (
            Route::create_message(sf(1)),
            Route::create_message(sf(2)),
            Route::create_message(sf(3)),
        );

        dispatcher.send(&one, None).await.unwrap();
        dispatcher.send(&two, None).await.unwrap();
        assert_eq!(dispatcher.bucket_count(), 2);

        // over the threshold: the bucket still counting down stays
        dispatcher.send(&three, None).await.unwrap();
        assert_eq!(dispatcher.bucket_count(), 2);
        assert!(dispatcher.bucket_state(&two.bucket_key()).await.is_none());
        let kept = dispatcher.bucket_state(&one.bucket_key()).await.unwrap();
        assert_eq!(kept.remaining, Some(4));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(dispatcher.prune_buckets(), 2);
        assert_eq!(dispatcher.bucket_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_429_does_not_block_other_buckets() {
        let transport = ScriptedTransport::new(|request, _| {
            static B_CALLS: AtomicU32 = AtomicU32::new(0);
            if request.path == "/channels/1/messages" && B_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(rate_limited(2.0, false));
            }
            Ok(HttpResponse::new(200))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        let start = Instant::now();

        let b = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher.send(&Route::create_message(sf(1)), None).await?;
                Ok::<_, HttpError>(Instant::now())
            })
        };
        let c = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher.send(&Route::create_message(sf(2)), None).await?;
                Ok::<_, HttpError>(Instant::now())
            })
        };

        let c_done = c.await.unwrap().unwrap();
        let b_done = b.await.unwrap().unwrap();
        assert!(c_done - start < Duration::from_secs(2));
        assert!(b_done - start >= Duration::from_secs(2));
        assert!(!dispatcher.global().is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_429_locks_every_bucket() {
        let transport = ScriptedTransport::new(|request, _| {
            if request.path == "/users/@me" {
                Ok(rate_limited(1.0, true))
            } else {
                Ok(HttpResponse::new(200))
            }
        });
        let config = DispatcherConfig {
            max_rate_limit_retries: 0,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(&transport, config);

        let err = dispatcher
            .send(&Route::current_user(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::RateLimited { global: true, .. }));
        assert!(dispatcher.global().is_locked());

        let start = Instant::now();
        dispatcher.send(&Route::get_guild(sf(9)), None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_exhausted() {
        let transport = ScriptedTransport::new(|_, _| Ok(rate_limited(0.5, false)));
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let err = dispatcher
            .send(&Route::get_channel(sf(1)), None)
            .await
            .unwrap_err();
        match err {
            HttpError::RateLimited {
                bucket,
                retry_after,
                global,
            } => {
                assert_eq!(bucket, "GET /channels/{channel_id}:1");
                assert_eq!(retry_after, Duration::from_millis(500));
                assert!(!global);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retry_with_backoff() {
        let transport = ScriptedTransport::new(|_, index| {
            if index < 2 {
                Ok(HttpResponse::new(502))
            } else {
                Ok(HttpResponse::new(200))
            }
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        let start = Instant::now();

        dispatcher.send(&Route::get_guild(sf(1)), None).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_exhausted() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(HttpResponse {
                status: 500,
                body: b"boom".to_vec(),
                ..HttpResponse::default()
            })
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let err = dispatcher.send(&Route::get_guild(sf(1)), None).await.unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 500, ref body } if body == "boom"));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(|_, _| Ok(HttpResponse::new(404)));
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let err = dispatcher.send(&Route::get_user(sf(1)), None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_surfaces() {
        let transport = ScriptedTransport::new(|_, _| {
            Err(TransportError::Connection("connection refused".to_string()))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let err = dispatcher.send(&Route::get_user(sf(1)), None).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(TransportError::Connection(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_suspended_waits() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(HttpResponse::new(200)
                .with_header("x-ratelimit-limit", 1)
                .with_header("x-ratelimit-remaining", 0)
                .with_header("x-ratelimit-reset-after", 10))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        let route = Route::create_message(sf(1));
        dispatcher.send(&route, None).await.unwrap();

        let waiting = {
            let dispatcher = Arc::clone(&dispatcher);
            let route = route.clone();
            tokio::spawn(async move { dispatcher.send(&route, None).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiting.is_finished());

        dispatcher.shutdown();
        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(HttpError::Cancelled)));
        assert_eq!(transport.calls(), 1);

        let after = dispatcher.send(&route, None).await;
        assert!(matches!(after, Err(HttpError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_bot() {
        let transport = ScriptedTransport::new(|request, _| {
            assert_eq!(request.path, "/gateway/bot");
            Ok(HttpResponse::new(200).with_json(&json!({
                "url": "wss://gateway.example",
                "shards": 2,
                "session_start_limit": {"total": 1000, "remaining": 1000, "reset_after": 0, "max_concurrency": 1}
            })))
        });
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());

        let info = dispatcher.gateway_bot().await.unwrap();
        assert_eq!(info.url, "wss://gateway.example");
        assert_eq!(info.shards, 2);
    }

    #[test]
    fn test_server_backoff_is_capped() {
        let transport = ScriptedTransport::new(|_, _| Ok(HttpResponse::new(200)));
        let dispatcher = dispatcher(&transport, DispatcherConfig::default());
        assert_eq!(dispatcher.server_backoff(0), Duration::from_millis(500));
        assert_eq!(dispatcher.server_backoff(1), Duration::from_secs(1));
        assert_eq!(dispatcher.server_backoff(4), Duration::from_secs(8));
        assert_eq!(dispatcher.server_backoff(30), Duration::from_secs(8));
    }
}
