use crate::config::{RateLimitConfig, is_write_method};
use crate::error::HttpError;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::{Layer, Service};

/// Per-client pacing state.
///
/// Holds the start instant of the most recent request and, in serialization
/// mode, the lock every request holds until its response headers arrive.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_start: Mutex<Option<Instant>>,
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_start: Mutex::new(None),
            serial: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Reserve the start slot for a request with `method`.
    ///
    /// The slot is `max(now, previous slot + delay)` and becomes the new
    /// previous slot immediately, so concurrent callers queue up one delay
    /// apart. The stored slot never moves backwards: a zero-delay request
    /// issued while a later slot is pending leaves that slot in place.
    /// Returns `None` when the request may start right away.
    #[must_use]
    pub fn reserve(&self, method: &Method) -> Option<Instant> {
        let delay = self.config.delay_for(method);
        let now = Instant::now();

        let mut last = self.last_start.lock();
        let start = match *last {
            Some(prev) if !delay.is_zero() => (prev + delay).max(now),
            _ => now,
        };
        *last = Some(last.map_or(start, |prev| prev.max(start)));

        (start > now).then_some(start)
    }

    /// Wait until this request's reserved slot.
    pub async fn pace(&self, method: &Method) {
        if let Some(start) = self.reserve(method) {
            tracing::trace!(
                method = %method,
                write = is_write_method(method),
                wait_ms = start.saturating_duration_since(Instant::now()).as_millis(),
                "rate limit: delaying request"
            );
            tokio::time::sleep_until(start).await;
        }
    }
}

/// Tower layer enforcing minimum spacing between requests on one client,
/// with an optional mode that lets only one request be in flight at a time.
///
/// Each layer instance owns its own [`RateLimiter`]; clients built from
/// different layers never share pacing.
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(config)),
        }
    }

    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Service created by [`RateLimitLayer`].
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for RateLimitService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            // Held until the response headers are back
            let _serial = if limiter.config().parallel_requests {
                None
            } else {
                Some(Arc::clone(&limiter.serial).lock_owned().await)
            };

            limiter.pace(req.method()).await;
            inner.call(req).await
        })
    }
}
