//! End-to-end client tests
//!
//! The client talks to the fake REST server and the fake gateway over real
//! sockets, starting from `SHARD_COUNT=auto`.

use std::time::Duration;

use anyhow::Result;
use integration_tests::*;
use relay_client::{Client, ClientError};
use relay_core::Snowflake;
use relay_gateway::{OpCode, PresenceUpdatePayload};
use tokio::sync::mpsc;

async fn servers() -> Result<(FakeGateway, FakeRest)> {
    let gateway = FakeGateway::start().await?;
    let rest = FakeRest::start(gateway.url(), 1).await?;
    Ok((gateway, rest))
}

fn client(rest: &FakeRest) -> Result<Client> {
    let config = test_config(&rest.base_url(), "ws://127.0.0.1:1", "auto");
    Ok(Client::builder(config)
        .shutdown_timeout(Duration::from_secs(2))
        .build()?)
}

#[tokio::test]
async fn test_full_session() -> Result<()> {
    let (mut gateway, rest) = servers().await?;
    let client = client(&rest)?;

    let user = client.login().await?;
    assert_eq!(user.id, Snowflake::new(100));
    assert!(client.get_user(Snowflake::new(100)).is_some());

    let (tx, mut guilds) = mpsc::unbounded_channel();
    client.on("GUILD_CREATE", move |event| {
        let _ = tx.send(event.data["id"].as_str().map(str::to_string));
    });
    client.update_presence(PresenceUpdatePayload::new("idle"))?;
    client.start().await?;
    assert!(client.is_running());
    assert_eq!(client.shard_states().len(), 1);

    // the plan comes from GET /gateway/bot
    let mut peer = gateway.accept().await?;
    peer.hello(45_000).await?;
    let identify = peer.expect(OpCode::Identify).await?;
    let payload = identify.as_identify().expect("identify payload");
    assert_eq!(payload.shard, [0, 1]);
    assert_eq!(
        payload.presence.map(|p| p.status),
        Some("idle".to_string())
    );

    peer.dispatch("READY", 1, ready("session-1", &gateway.url(), [0, 1], &["1"]))
        .await?;
    peer.dispatch("GUILD_CREATE", 2, guild("1", "10", "20")).await?;

    let created = tokio::time::timeout(STEP_TIMEOUT, guilds.recv()).await?;
    assert_eq!(created, Some(Some("1".to_string())));
    assert_eq!(client.guilds().len(), 1);
    assert_eq!(
        client.get_channel(Snowflake::new(10)).and_then(|c| c.guild_id),
        Some(Snowflake::new(1))
    );

    let sent = client.send_message(Snowflake::new(10), "hello").await?;
    assert_eq!(sent.content.as_deref(), Some("hello"));
    assert_eq!(sent.author_id, Some(Snowflake::new(100)));
    assert!(client.get_message(sent.id).is_some());

    client.shutdown().await;
    assert!(!client.is_running());
    assert_eq!(peer.closed().await?, Some(1000));

    assert!(matches!(client.start().await, Err(ClientError::Closed)));
    assert!(matches!(
        client.send_message(Snowflake::new(10), "late").await,
        Err(ClientError::Http(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_presence_update_reaches_connected_shard() -> Result<()> {
    let (mut gateway, rest) = servers().await?;
    let client = client(&rest)?;
    client.start().await?;

    let mut peer = gateway.accept().await?;
    peer.hello(45_000).await?;
    peer.expect(OpCode::Identify).await?;
    peer.dispatch("READY", 1, ready("session-2", &gateway.url(), [0, 1], &[]))
        .await?;

    let mut states = client.shard_states();
    for _ in 0..50 {
        if states.iter().all(|s| s.is_ready()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        states = client.shard_states();
    }
    assert!(states.iter().all(|s| s.is_ready()));

    client.update_presence(PresenceUpdatePayload::new("dnd"))?;
    let update = peer.expect(OpCode::PresenceUpdate).await?;
    assert_eq!(
        update.as_presence_update().map(|p| p.status),
        Some("dnd".to_string())
    );

    let err = client
        .update_presence(PresenceUpdatePayload::new("busy"))
        .unwrap_err();
    assert!(matches!(err, ClientError::Gateway(_)));

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_start_twice_is_rejected() -> Result<()> {
    let (_gateway, rest) = servers().await?;
    let client = client(&rest)?;

    client.start().await?;
    assert!(matches!(client.start().await, Err(ClientError::AlreadyStarted)));

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_rejected_token_is_reported() -> Result<()> {
    let (mut gateway, rest) = servers().await?;
    let client = client(&rest)?;
    client.start().await?;

    let mut peer = gateway.accept().await?;
    peer.hello(45_000).await?;
    peer.expect(OpCode::Identify).await?;
    peer.close(4004).await?;

    let (shard_id, error) = tokio::time::timeout(STEP_TIMEOUT, client.next_fatal())
        .await?
        .expect("fatal error reported");
    assert_eq!(shard_id, 0);
    assert!(ClientError::from(error).is_unauthorized());

    client.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_login_with_wrong_token() -> Result<()> {
    let (_gateway, rest) = servers().await?;
    let config = config_with(
        &rest.base_url(),
        "ws://127.0.0.1:1",
        "auto",
        &[("BOT_TOKEN", "wrong")],
    );
    let client = Client::new(config)?;

    let err = client.login().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(client.current_user().is_none());
    Ok(())
}
