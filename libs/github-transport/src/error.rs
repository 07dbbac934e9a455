use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Lets callers match on the failure mode without depending on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors surfaced by the transport and its request/response helpers.
///
/// The layers themselves only ever pass these through: a non-2xx status is an
/// `Ok(response)` until the caller asks for it to be an error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Total operation deadline exceeded (including all retries)
    #[error("Operation deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Transport error (DNS, connect, reset, ...)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS handshake or certificate verification failure
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status, produced only by the checked body readers
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// JSON (de)serialization error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Invalid URL (failed to parse)
    ///
    /// Match on `kind`; `reason` is a diagnostic with no stable format.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// Rejected transport configuration
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

impl HttpError {
    /// Classify a connector/client failure as [`HttpError::Tls`] when a
    /// `rustls::Error` sits anywhere in its source chain, otherwise as
    /// [`HttpError::Transport`].
    #[must_use]
    pub fn from_transport(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        if is_tls_failure(err.as_ref()) {
            HttpError::Tls(err)
        } else {
            HttpError::Transport(err)
        }
    }

    /// Whether the retry layer may reissue the request after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HttpError::Transport(_) | HttpError::Tls(_) | HttpError::Timeout(_)
        )
    }
}

/// `io::Error::source` skips the wrapped error, so custom io errors are
/// unwrapped through `get_ref` as well.
fn is_tls_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return true;
        }
        if let Some(inner) = e
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
            && is_tls_failure(inner)
        {
            return true;
        }
        current = e.source();
    }
    false
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::from_transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::from_transport(Box::new(err))
    }
}
