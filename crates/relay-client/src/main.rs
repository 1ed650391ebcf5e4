//! Example bot
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p relay-client --bin relay-bot
//! ```
//!
//! Answers `!ping` with `pong` and logs shard lifecycle events.

use anyhow::Context;
use relay_client::Client;
use relay_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use relay_core::Snowflake;
use relay_gateway::PresenceUpdatePayload;
use serde_json::json;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Bot stopped");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    info!(app = %config.app.name, env = ?config.app.env, "Starting bot");

    let client = Client::new(config).context("failed to build client")?;
    let user = client.login().await.context("token rejected")?;
    info!(user_id = %user.id, "Token accepted");

    register_handlers(&client);
    client.update_presence(
        PresenceUpdatePayload::new("online").with_activity(json!({"name": "!ping", "type": 2})),
    )?;
    client.start().await.context("failed to start shards")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Shutdown requested");
        }
        fatal = client.next_fatal() => {
            if let Some((shard_id, e)) = fatal {
                error!(shard_id, error = %e, "Shard stopped");
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

fn register_handlers(client: &Client) {
    client.on("READY", |event| {
        let guilds = event.data["guilds"].as_array().map_or(0, Vec::len);
        info!(shard_id = event.shard_id, guilds, "Shard ready");
    });

    client.on("RESUMED", |event| {
        info!(shard_id = event.shard_id, "Shard resumed");
    });

    let replier = client.clone();
    client.on("MESSAGE_CREATE", move |event| {
        if event.data["content"].as_str() != Some("!ping") {
            return;
        }
        if event.data["author"]["bot"].as_bool() == Some(true) {
            return;
        }
        let Some(channel_id) = event.data["channel_id"]
            .as_str()
            .and_then(|id| id.parse::<Snowflake>().ok())
        else {
            warn!("Message without channel");
            return;
        };

        let client = replier.clone();
        tokio::spawn(async move {
            if let Err(e) = client.send_message(channel_id, "pong").await {
                warn!(channel_id = %channel_id, error = %e, "Failed to reply");
            }
        });
    });
}
