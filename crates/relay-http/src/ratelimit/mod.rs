//! Rate-limit state

mod bucket;
mod global;
mod headers;

pub use bucket::RateLimitBucket;
pub use global::GlobalRateLimit;
pub use headers::RateLimitHeaders;
