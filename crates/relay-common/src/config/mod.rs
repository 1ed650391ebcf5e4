//! Configuration structs

mod client_config;

pub use client_config::{
    AppSettings, AuthConfig, CacheConfig, ClientConfig, ConfigError, Environment, GatewayConfig,
    HttpConfig, ShardCount,
};
