use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Cap on the body bytes copied into `HttpError::HttpStatus::body_preview`.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Body type produced by every layer of the transport.
///
/// Holds either the decompressed network body or a replayed cached body.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse `Retry-After` as delta-seconds or an HTTP-date.
///
/// Returns `None` when the header is missing, unparseable, negative, or a date
/// that has already passed.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let at = httpdate::parse_http_date(trimmed).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// GitHub's primary rate-limit counters, read from `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Reset instant as Unix epoch seconds
    pub reset: u64,
}

impl RateLimitStatus {
    /// `None` unless all three headers are present and numeric.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| -> Option<u64> { headers.get(name)?.to_str().ok()?.trim().parse().ok() };
        Some(Self {
            limit: read("x-ratelimit-limit")?,
            remaining: read("x-ratelimit-remaining")?,
            reset: read("x-ratelimit-reset")?,
        })
    }
}

/// Response handle returned by [`RequestBuilder::send`](crate::RequestBuilder::send).
///
/// Every status is returned as-is; only the `checked_*`, `json` and `text`
/// readers turn non-2xx into [`HttpError::HttpStatus`]. All body reads enforce
/// the client's `max_body_size`.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The `ETag` validator, if the server sent one
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.inner
            .headers()
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
    }

    /// Primary rate-limit counters reported with this response
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitStatus> {
        RateLimitStatus::from_headers(self.inner.headers())
    }

    /// Consume the wrapper and return the underlying response
    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Streaming access to the body; no size limit is applied.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    /// Return `HttpError::HttpStatus` for non-2xx without reading the body.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` with an empty preview if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }
        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type: content_type(self.inner.headers()),
            retry_after: parse_retry_after(self.inner.headers()),
        })
    }

    /// Read the body without a status check.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if the body exceeds `max_body_size`.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Read the body, failing on non-2xx with a preview of the error body.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` or `HttpError::BodyTooLarge`.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        checked_body(self.inner, self.max_body_size).await
    }

    /// Deserialize a 2xx JSON body.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus`, `HttpError::BodyTooLarge` or `HttpError::Json`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read a 2xx body as lossy UTF-8.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` or `HttpError::BodyTooLarge`.
    pub async fn text(self) -> Result<String, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn checked_body(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, HttpError> {
    let status = response.status();
    if status.is_success() {
        return read_body_limited(response, max_body_size).await;
    }

    let content_type = content_type(response.headers());
    let retry_after = parse_retry_after(response.headers());

    // An oversized error body must not hide the status itself
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };

    Err(HttpError::HttpStatus {
        status,
        body_preview,
        content_type,
        retry_after,
    })
}

/// Collect the (decompressed) body, failing once it grows past `limit`.
pub(crate) async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let total = collected.len() + chunk.len();
            if total > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: total,
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
