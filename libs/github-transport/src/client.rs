use crate::builder::TransportBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::layers::ResponseCache;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tower::buffer::Buffer;

/// Future returned by the composed transport service
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// The composed transport chain behind a `Buffer` worker
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// GitHub API client over the layered transport.
///
/// Every request passes through retry, header injection, pacing and the
/// conditional cache (outermost first) before reaching the network. Each
/// client owns its own pacing clock and cache, so clients pointed at
/// different hosts never throttle or revalidate against each other.
///
/// `GithubClient` is `Clone + Send + Sync`. Clones share the same chain and
/// therefore the same pacing and cache.
///
/// ```ignore
/// let client = GithubClient::builder()
///     .token("ghp_xxx")
///     .preview("application/vnd.github.squirrel-girl-preview+json")
///     .build()?;
///
/// let repo: Repo = client
///     .get("https://api.github.com/repos/octo/hello")
///     .send()
///     .await?
///     .json()
///     .await?;
/// ```
#[derive(Clone)]
pub struct GithubClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
    pub(crate) cache: Option<Arc<ResponseCache>>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .field("cache_entries", &self.cache.as_ref().map(|c| c.len()))
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    /// Client with the default configuration (anonymous, HTTPS only).
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        TransportBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Start a request with an arbitrary method.
    ///
    /// The URL must be absolute. Query parameters are encoded by the caller.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// The composed tower service, for callers that drive `http::Request`s
    /// directly. Responses are returned for every status; no body limit is
    /// applied.
    #[must_use]
    pub fn service(&self) -> BufferedService {
        self.service.clone()
    }

    /// Entries of the conditional cache, `None` when caching is disabled.
    #[must_use]
    pub fn cache(&self) -> Option<Arc<ResponseCache>> {
        self.cache.clone()
    }
}

/// Map buffer errors to `HttpError`
///
/// Errors from the chain come back boxed; anything else means the buffer
/// worker is gone.
#[must_use]
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; transport unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}
