//! REST dispatcher tests against a local axum server

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use integration_tests::*;
use relay_core::Snowflake;
use relay_http::{HttpError, Method, RequestDispatcher, ReqwestTransport, Route};
use serde_json::{json, Value};

async fn dispatcher(rest: &FakeRest, token: &str) -> Result<Arc<RequestDispatcher>> {
    let config = config_with(&rest.base_url(), "ws://127.0.0.1:1", "1", &[("BOT_TOKEN", token)]);
    let transport = ReqwestTransport::new(&config.http, &config.auth.token)?;
    Ok(Arc::new(RequestDispatcher::new(Arc::new(transport), &config.http)))
}

#[tokio::test]
async fn test_gateway_bot() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 4).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;

    let info = dispatcher.gateway_bot().await?;
    assert_eq!(info.url, "ws://gateway.test");
    assert_eq!(info.shards, 4);
    assert_eq!(info.session_start_limit.max_concurrency, 1);
    Ok(())
}

#[tokio::test]
async fn test_token_is_sent() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;

    let accepted = dispatcher(&rest, TOKEN).await?;
    let user: Value = accepted.request(&Route::current_user(), None).await?;
    assert_eq!(user["id"], BOT_ID);

    let rejected = dispatcher(&rest, "wrong").await?;
    let err = rejected
        .request::<Value>(&Route::current_user(), None)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    Ok(())
}

#[tokio::test]
async fn test_exhausted_bucket_delays_next_request() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;
    let route = Route::create_message(Snowflake::new(10));

    let first: Value = dispatcher
        .request(&route, Some(json!({"content": "one"})))
        .await?;
    assert_eq!(first["content"], "one");

    let started = Instant::now();
    let second: Value = dispatcher
        .request(&route, Some(json!({"content": "two"})))
        .await?;
    assert_eq!(second["content"], "two");
    assert!(started.elapsed() >= Duration::from_millis(150));

    let bucket = dispatcher
        .bucket_state(&route.bucket_key())
        .await
        .expect("bucket tracked");
    assert_eq!(bucket.limit, Some(1));
    assert_eq!(bucket.bucket_id.as_deref(), Some("messages"));
    Ok(())
}

#[tokio::test]
async fn test_buckets_do_not_block_each_other() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;

    // exhausted for 30 seconds
    let slow = Route::new(Method::GET, "/slow-bucket");
    dispatcher.send(&slow, None).await?;

    let started = Instant::now();
    dispatcher
        .send(&Route::create_message(Snowflake::new(11)), Some(json!({"content": "x"})))
        .await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;

    let started = Instant::now();
    let response = dispatcher
        .send(&Route::new(Method::GET, "/flaky/rate-limited"), None)
        .await?;
    assert_eq!(response.status, 200);
    assert_eq!(rest.state.rate_limited_calls.load(Ordering::SeqCst), 2);
    // body retry_after wins over the header
    assert!(started.elapsed() < Duration::from_millis(900));
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_retried() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;

    let response = dispatcher
        .send(&Route::new(Method::GET, "/flaky/server-error"), None)
        .await?;
    assert_eq!(response.status, 200);
    assert_eq!(rest.state.failing_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;

    let err = dispatcher
        .send(&Route::new(Method::GET, "/nowhere"), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_waiting_requests() -> Result<()> {
    let rest = FakeRest::start("ws://gateway.test", 1).await?;
    let dispatcher = dispatcher(&rest, TOKEN).await?;
    let slow = Route::new(Method::GET, "/slow-bucket");
    dispatcher.send(&slow, None).await?;

    let waiting = {
        let dispatcher = Arc::clone(&dispatcher);
        let slow = slow.clone();
        tokio::spawn(async move { dispatcher.send(&slow, None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    dispatcher.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), waiting).await??;
    assert!(matches!(result, Err(HttpError::Cancelled)));

    let after = dispatcher.send(&slow, None).await;
    assert!(matches!(after, Err(HttpError::Cancelled)));
    Ok(())
}
