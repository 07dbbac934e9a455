#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound HTTP transport for GitHub API clients
//!
//! Every request made through a [`GithubClient`] passes through one composed
//! tower stack (outermost first):
//!
//! - **Retry**: fixed delay between attempts; transport errors, per-attempt
//!   timeouts and a configurable set of statuses (default 500/502/503/504) are
//!   retried up to `max_retries` times
//! - **Header injection**: `Accept: application/vnd.github+json` plus preview
//!   media types are comma-joined onto the caller's `Accept`; `User-Agent` is
//!   set when missing
//! - **Rate limit**: separate minimum spacing for reads and writes, and an
//!   optional mode that runs one request at a time
//! - **Conditional cache**: `ETag`/`Last-Modified` revalidation, `304`
//!   answered from the stored body, invalidation on any mutation of the URI
//! - **Bearer auth** (when a token is configured)
//! - Per-attempt timeout, transparent decompression, and a pooled hyper
//!   client over rustls (certificate verification can be disabled for
//!   self-signed GitHub Enterprise hosts)
//!
//! Pacing state and cache entries belong to one client and its clones; two
//! clients built separately never interfere.
//!
//! # Example
//!
//! ```ignore
//! use github_transport::GithubClient;
//! use std::time::Duration;
//!
//! let client = GithubClient::builder()
//!     .token(std::env::var("GITHUB_TOKEN")?)
//!     .write_delay(Duration::from_secs(1))
//!     .max_retries(3)
//!     .build()?;
//!
//! let resp = client.get("https://api.github.com/user").send().await?;
//! if let Some(rate) = resp.rate_limit() {
//!     tracing::info!(remaining = rate.remaining, "rate limit");
//! }
//! let user: serde_json::Value = resp.json().await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
pub mod layers;
mod request;
mod response;
mod secret;
mod tls;

pub use builder::TransportBuilder;
pub use client::{BufferedService, GithubClient, ServiceFuture};
pub use config::{
    CacheConfig, DEFAULT_MAX_CACHE_ENTRY_BYTES, DEFAULT_USER_AGENT, GITHUB_MEDIA_TYPE,
    RateLimitConfig, RetryConfig, TlsRootConfig, TransportConfig, TransportSecurity,
    is_cacheable_method, is_write_method,
};
pub use error::{HttpError, InvalidUriKind};
pub use request::RequestBuilder;
pub use response::{HttpResponse, RateLimitStatus, ResponseBody, parse_retry_after};
pub use secret::SecretString;
