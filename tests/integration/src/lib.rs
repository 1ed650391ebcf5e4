//! Integration test utilities
//!
//! Local stand-ins for the platform: a WebSocket gateway driven step by step
//! from the test, and a REST server with scripted rate limits.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
