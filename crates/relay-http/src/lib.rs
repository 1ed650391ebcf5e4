//! # relay-http
//!
//! Rate-limited REST client.
//!
//! ## Features
//!
//! - **Per-route buckets**: requests sharing a route template and major
//!   parameter share one budget, learned from response headers
//! - **Global lock**: a global 429 pauses every bucket
//! - **Retries**: bounded retries for 429 and 5xx responses
//! - **Pluggable transport**: [`HttpTransport`] with a `reqwest` implementation
//!
//! ## Example
//!
//! ```ignore
//! use relay_http::{RequestDispatcher, ReqwestTransport, Route};
//!
//! let transport = ReqwestTransport::new(&config.http, &config.auth.token)?;
//! let dispatcher = RequestDispatcher::new(Arc::new(transport), &config.http);
//!
//! let response = dispatcher.send(&Route::get_channel(channel_id), None).await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod route;
pub mod transport;

pub use dispatcher::{DispatcherConfig, RequestDispatcher};
pub use error::{HttpError, TransportError};
pub use models::{GatewayBotInfo, GuildTemplate, Invite, SessionStartLimit};
pub use ratelimit::{GlobalRateLimit, RateLimitBucket, RateLimitHeaders};
pub use route::{Method, Route};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
