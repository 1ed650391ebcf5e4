//! Gateway tests against a local WebSocket server
//!
//! Shards use the real `tokio-tungstenite` connector.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use integration_tests::*;
use relay_cache::EntityCache;
use relay_core::Snowflake;
use relay_gateway::{
    ConnectionConfig, ConnectionStatus, EventRegistry, GatewayError, GatewayMessage,
    IdentifyGate, OpCode, ShardContext, ShardManager, ShardPlan, ShardState,
    TungsteniteConnector,
};
use serde_json::json;
use tokio::sync::{mpsc, watch};

struct Shards {
    manager: ShardManager,
    cache: Arc<EntityCache>,
    events: EventRegistry,
}

fn start_shards(gateway: &FakeGateway, shard_count: u32) -> Result<Shards> {
    let config = test_config("http://127.0.0.1:1", &gateway.url(), &shard_count.to_string());
    let cache = Arc::new(EntityCache::new(&config.cache));
    let events = EventRegistry::new();
    let context = ShardContext {
        config: Arc::new(ConnectionConfig::from_client_config(&config, gateway.url())),
        connector: Arc::new(TungsteniteConnector),
        gate: Arc::new(IdentifyGate::new(1, config.gateway.identify_interval())),
        cache: Arc::clone(&cache),
        events: events.clone(),
    };
    let plan = ShardPlan::new(gateway.url(), shard_count, 1)?;
    Ok(Shards {
        manager: ShardManager::start(plan, context),
        cache,
        events,
    })
}

async fn wait_for_state<F>(rx: &mut watch::Receiver<ShardState>, predicate: F) -> Result<ShardState>
where
    F: Fn(&ShardState) -> bool,
{
    let state = tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(|s| predicate(s))).await??;
    Ok(state.clone())
}

/// Hello, Identify, READY on a fresh connection
async fn handshake(
    gateway: &mut FakeGateway,
    session_id: &str,
    shard: [u32; 2],
) -> Result<GatewayPeer> {
    let mut peer = gateway.accept().await?;
    peer.hello(45_000).await?;
    let identify = peer.expect(OpCode::Identify).await?;
    assert_eq!(identify.as_identify().map(|p| p.shard), Some(shard));
    peer.dispatch("READY", 1, ready(session_id, &gateway.url(), shard, &["1"]))
        .await?;
    Ok(peer)
}

#[tokio::test]
async fn test_identify_ready_and_dispatch() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;
    let mut state = shards.manager.subscribe_state(0).expect("shard 0");

    let mut peer = gateway.accept().await?;
    assert!(peer.uri.contains("v=10"));
    assert!(peer.uri.contains("encoding=json"));

    peer.hello(45_000).await?;
    let identify = peer.expect(OpCode::Identify).await?;
    let payload = identify.as_identify().expect("identify payload");
    assert_eq!(payload.token, TOKEN);
    assert_eq!(payload.shard, [0, 1]);

    peer.dispatch("READY", 1, ready("session-a", &gateway.url(), [0, 1], &["1"]))
        .await?;
    let ready_state = wait_for_state(&mut state, ShardState::is_ready).await?;
    assert_eq!(ready_state.session_id.as_deref(), Some("session-a"));
    assert!(shards.manager.all_ready());

    let (tx, mut created) = mpsc::unbounded_channel();
    shards.events.on("MESSAGE_CREATE", move |event| {
        let _ = tx.send(event.clone());
    });

    peer.dispatch("GUILD_CREATE", 2, guild("1", "10", "20")).await?;
    peer.dispatch("MESSAGE_CREATE", 3, message("30", "10", Some("1"), "hi"))
        .await?;

    let event = tokio::time::timeout(STEP_TIMEOUT, created.recv())
        .await?
        .expect("MESSAGE_CREATE delivered");
    assert_eq!(event.shard_id, 0);
    assert_eq!(event.sequence, Some(3));

    let cache = &shards.cache;
    assert_eq!(
        cache.guild(Snowflake::new(1)).and_then(|g| g.name),
        Some("guild-1".to_string())
    );
    assert!(cache.channel(Snowflake::new(10)).is_some());
    assert!(cache.role(Snowflake::new(20)).is_some());
    assert!(cache.member(Snowflake::new(1), Snowflake::new(100)).is_some());
    assert_eq!(
        cache.message(Snowflake::new(30)).and_then(|m| m.content),
        Some("hi".to_string())
    );

    shards.manager.shutdown(Duration::from_secs(2)).await;
    assert_eq!(peer.closed().await?, Some(1000));
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_carries_last_sequence() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;

    let mut peer = gateway.accept().await?;
    peer.hello(100).await?;
    peer.expect(OpCode::Identify).await?;
    peer.dispatch("READY", 7, ready("session-b", &gateway.url(), [0, 1], &[]))
        .await?;

    // a beat may already be in flight from before READY
    loop {
        let beat = peer.recv().await?;
        assert_eq!(beat.op, OpCode::Heartbeat);
        peer.send(&GatewayMessage::heartbeat_ack()).await?;
        if beat.as_heartbeat_seq() == Some(Some(7)) {
            break;
        }
    }

    // acknowledged, so the next beat arrives on schedule
    let beat = peer.recv().await?;
    assert_eq!(beat.op, OpCode::Heartbeat);

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

#[tokio::test]
async fn test_resume_after_abnormal_close() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;
    let mut state = shards.manager.subscribe_state(0).expect("shard 0");

    let mut first = handshake(&mut gateway, "session-c", [0, 1]).await?;
    first.dispatch("GUILD_CREATE", 2, guild("1", "10", "20")).await?;
    wait_for_state(&mut state, |s| s.sequence == Some(2)).await?;

    first.close(4000).await?;

    let mut second = gateway.accept().await?;
    second.hello(45_000).await?;
    let resume = second.expect(OpCode::Resume).await?;
    let payload = resume.as_resume().expect("resume payload");
    assert_eq!(payload.session_id, "session-c");
    assert_eq!(payload.seq, Some(2));

    second.dispatch("RESUMED", 3, json!({})).await?;
    let resumed = wait_for_state(&mut state, |s| s.is_ready() && s.sequence == Some(3)).await?;
    assert_eq!(resumed.session_id.as_deref(), Some("session-c"));

    // a resumed session keeps what the cache already knows
    assert!(shards.cache.guild(Snowflake::new(1)).is_some());
    assert_eq!(
        shards.cache.channel(Snowflake::new(10)).and_then(|c| c.guild_id),
        Some(Snowflake::new(1))
    );
    assert!(shards.cache.role(Snowflake::new(20)).is_some());

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_session_identifies_again() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;

    let mut first = handshake(&mut gateway, "session-d", [0, 1]).await?;
    first.send(&GatewayMessage::invalid_session(false)).await?;
    assert_eq!(first.closed().await?, Some(1000));

    let mut second = gateway.accept().await?;
    second.hello(45_000).await?;
    second.expect(OpCode::Identify).await?;

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

#[tokio::test]
async fn test_reconnect_request_resumes() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;

    let mut first = handshake(&mut gateway, "session-e", [0, 1]).await?;
    first.send(&GatewayMessage::reconnect()).await?;
    assert_eq!(first.closed().await?, Some(4000));

    let mut second = gateway.accept().await?;
    second.hello(45_000).await?;
    let resume = second.expect(OpCode::Resume).await?;
    assert_eq!(
        resume.as_resume().map(|p| p.session_id),
        Some("session-e".to_string())
    );

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 1)?;
    let mut state = shards.manager.subscribe_state(0).expect("shard 0");

    let mut peer = gateway.accept().await?;
    peer.hello(45_000).await?;
    peer.expect(OpCode::Identify).await?;
    peer.close(4004).await?;

    let (shard_id, error) = tokio::time::timeout(STEP_TIMEOUT, shards.manager.next_fatal())
        .await?
        .expect("fatal error reported");
    assert_eq!(shard_id, 0);
    assert!(matches!(error, GatewayError::Fatal { code: 4004, .. }));

    wait_for_state(&mut state, |s| s.status == ConnectionStatus::Disconnected).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(gateway.no_pending_connection());

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}

#[tokio::test]
async fn test_shards_identify_one_after_another() -> Result<()> {
    let mut gateway = FakeGateway::start().await?;
    let shards = start_shards(&gateway, 2)?;

    let mut seen = Vec::new();
    let mut peers = Vec::new();
    for _ in 0..2 {
        let mut peer = gateway.accept().await?;
        peer.hello(45_000).await?;
        let identify = peer.expect(OpCode::Identify).await?;
        let shard = identify.as_identify().expect("identify payload").shard;
        peer.dispatch("READY", 1, ready("s", &gateway.url(), shard, &[]))
            .await?;
        seen.push(shard);
        peers.push(peer);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![[0, 2], [1, 2]]);

    let mut state = shards.manager.subscribe_state(1).expect("shard 1");
    wait_for_state(&mut state, ShardState::is_ready).await?;
    let mut state = shards.manager.subscribe_state(0).expect("shard 0");
    wait_for_state(&mut state, ShardState::is_ready).await?;
    assert!(shards.manager.all_ready());

    shards.manager.shutdown(Duration::from_secs(2)).await;
    Ok(())
}
