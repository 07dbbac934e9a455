use crate::config::RetryConfig;
use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Bytes of a discarded response body read before a retry so the pooled
/// connection can be reused.
pub const RETRY_DRAIN_LIMIT: usize = 64 * 1024;

/// Tower layer that reissues a request on transport failures and on
/// configured transient status codes, waiting a fixed delay between attempts.
#[derive(Clone, Debug)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self::with_total_timeout(config, None)
    }

    /// Same as [`new`](Self::new) with a deadline spanning every attempt and delay.
    #[must_use]
    pub fn with_total_timeout(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config: Arc::new(config),
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: Arc::clone(&self.config),
            total_timeout: self.total_timeout,
        }
    }
}

/// Service created by [`RetryLayer`].
///
/// When attempts run out, or the next one could not start before
/// `total_timeout`, the last response or error is returned untouched: a
/// persistently failing endpoint looks exactly as it would without retries.
/// Only an attempt cut off by the deadline yields
/// [`HttpError::DeadlineExceeded`].
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    config: Arc<RetryConfig>,
    total_timeout: Option<Duration>,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);
        let total_timeout = self.total_timeout;

        let (parts, body) = req.into_parts();
        let version = parts.version;
        let extensions = parts.extensions.clone();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let method = parts.method.clone();
            let host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);
            let deadline = total_timeout.map(|t| (tokio::time::Instant::now() + t, t));

            let mut attempt = 0usize;
            loop {
                if let Some((at, total)) = deadline
                    && tokio::time::Instant::now() >= at
                {
                    return Err(HttpError::DeadlineExceeded(total));
                }

                let mut req = Request::from_parts((*parts).clone(), body.clone());
                *req.version_mut() = version;
                *req.extensions_mut() = extensions.clone();

                let mut svc = inner.clone();
                let send = async move {
                    match svc.ready().await {
                        Ok(ready) => ready.call(req).await,
                        Err(e) => Err(e),
                    }
                };
                let result = match deadline {
                    Some((at, total)) => tokio::time::timeout_at(at, send)
                        .await
                        .unwrap_or(Err(HttpError::DeadlineExceeded(total))),
                    None => send.await,
                };
                let exhausted = attempt >= config.max_retries;

                match result {
                    Ok(resp) => {
                        let status = resp.status();
                        let advertised = config.retry_after_wait(status, resp.headers());
                        let retryable = advertised.is_some() || config.should_retry_status(status);
                        if exhausted || !retryable {
                            return Ok(resp);
                        }
                        let wait = advertised.unwrap_or(config.delay);
                        let Some(delay) = delay_within(wait, deadline) else {
                            return Ok(resp);
                        };

                        drain_for_reuse(resp).await;
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            status = status.as_u16(),
                            retry_after = advertised.is_some(),
                            method = %method,
                            host = %host,
                            delay_ms = delay.as_millis(),
                            "retrying request after status code"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => {
                        if exhausted || !err.is_retryable() {
                            return Err(err);
                        }
                        let Some(delay) = delay_within(config.delay, deadline) else {
                            return Err(err);
                        };

                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            error = %err,
                            method = %method,
                            host = %host,
                            delay_ms = delay.as_millis(),
                            "retrying request after error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                attempt += 1;
            }
        })
    }
}

/// `Some(delay)` when the next attempt would still start before the deadline.
fn delay_within(
    delay: Duration,
    deadline: Option<(tokio::time::Instant, Duration)>,
) -> Option<Duration> {
    match deadline {
        Some((at, _)) if tokio::time::Instant::now() + delay >= at => None,
        _ => Some(delay),
    }
}

/// Read and discard up to [`RETRY_DRAIN_LIMIT`] bytes of a response that is
/// about to be retried. Bodies announced as larger are dropped unread.
async fn drain_for_reuse(response: Response<ResponseBody>) {
    let announced = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    if announced.is_some_and(|len| len > RETRY_DRAIN_LIMIT as u64) {
        return;
    }

    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                drained += frame.data_ref().map_or(0, Bytes::len);
                if drained >= RETRY_DRAIN_LIMIT {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to drain response body before retry");
                break;
            }
        }
    }
}
