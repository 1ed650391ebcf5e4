//! Rate-limit response headers

use std::time::Duration;

use serde::Deserialize;

use crate::transport::HttpResponse;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const BUCKET: &str = "x-ratelimit-bucket";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const RETRY_AFTER: &str = "retry-after";

/// Rate-limit information carried by one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub global: bool,
    pub retry_after: Option<Duration>,
}

/// Body of a 429 response
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

impl RateLimitHeaders {
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            limit: response.header(LIMIT).and_then(|v| v.parse().ok()),
            remaining: response.header(REMAINING).and_then(|v| v.parse().ok()),
            reset_after: response.header(RESET_AFTER).and_then(parse_seconds),
            bucket: response.header(BUCKET).map(str::to_string),
            global: response
                .header(GLOBAL)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: response.header(RETRY_AFTER).and_then(parse_seconds),
        }
    }

    /// Wait and scope for a 429 response
    ///
    /// The JSON body wins over the headers; with neither present the
    /// bucket reset is used, then one second.
    pub fn rate_limit_of(response: &HttpResponse) -> (Duration, bool) {
        let headers = Self::from_response(response);
        match serde_json::from_slice::<RateLimitedBody>(&response.body) {
            Ok(body) if body.retry_after.is_finite() && body.retry_after >= 0.0 => (
                Duration::from_secs_f64(body.retry_after),
                body.global || headers.global,
            ),
            _ => (
                headers
                    .retry_after
                    .or(headers.reset_after)
                    .unwrap_or(Duration::from_secs(1)),
                headers.global,
            ),
        }
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}
