//! # relay-client
//!
//! Client facade tying the gateway, the REST dispatcher and the entity cache
//! together.
//!
//! ## Example
//!
//! ```ignore
//! use relay_client::Client;
//! use relay_common::ClientConfig;
//!
//! let client = Client::new(ClientConfig::from_env()?)?;
//! client.on("MESSAGE_CREATE", |event| {
//!     tracing::info!(shard_id = event.shard_id, "New message");
//! });
//!
//! client.login().await?;
//! client.start().await?;
//! ```

pub mod client;
pub mod error;
mod ingest;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, ClientResult};
