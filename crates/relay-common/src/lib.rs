//! # relay-common
//!
//! Client configuration loaded from the environment, and logging setup.

pub mod config;
pub mod telemetry;

pub use config::{
    AppSettings, AuthConfig, CacheConfig, ClientConfig, ConfigError, Environment, GatewayConfig,
    HttpConfig, ShardCount,
};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
