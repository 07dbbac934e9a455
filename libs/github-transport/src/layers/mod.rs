//! Tower layers composing the GitHub transport chain.
//!
//! ## Available Layers
//!
//! - [`RetryLayer`] - Fixed-delay retry on transport errors and listed statuses
//! - [`HeaderInjectionLayer`] - Comma-joins opt-in headers (preview media types)
//! - [`RateLimitLayer`] - Spaces request starts, optionally one at a time
//! - [`ConditionalCacheLayer`] - `ETag`/`Last-Modified` revalidation
//! - [`BearerAuthLayer`] - `Authorization: Bearer` injection
//!
//! [`TransportBuilder`](crate::TransportBuilder) stacks them in the order
//! listed, outermost first.

mod bearer;
mod cache;
mod headers;
mod rate_limit;
mod retry;

pub use bearer::{BearerAuthLayer, BearerAuthService};
pub use cache::{
    CacheEntry, CacheKey, ConditionalCacheLayer, ConditionalCacheService, ResponseCache, Validator,
};
pub use headers::{HeaderInjectionLayer, HeaderInjectionService};
pub use rate_limit::{RateLimitLayer, RateLimitService, RateLimiter};
pub use retry::{RETRY_DRAIN_LIMIT, RetryLayer, RetryService};
