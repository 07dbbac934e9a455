use crate::client::{BufferedService, GithubClient};
use crate::config::{CacheConfig, TlsRootConfig, TransportConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{
    BearerAuthLayer, ConditionalCacheLayer, HeaderInjectionLayer, RateLimitLayer, RetryLayer,
};
use crate::response::ResponseBody;
use crate::secret::SecretString;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased service between the composition steps of [`TransportBuilder::build`].
type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

/// Builder for a [`GithubClient`].
///
/// Starts from [`TransportConfig::default`]; every setter overrides one field.
pub struct TransportBuilder {
    config: TransportConfig,
}

impl TransportBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Authenticate every request with `Authorization: Bearer <token>`.
    ///
    /// An empty token builds an anonymous client.
    #[must_use]
    pub fn token(mut self, token: impl Into<SecretString>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Skip TLS certificate verification.
    ///
    /// For GitHub Enterprise hosts with self-signed certificates.
    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Accept plain `http://` URLs (mock servers only).
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Minimum spacing before `GET`/`HEAD`/`OPTIONS` requests
    #[must_use]
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.config.read_delay = delay;
        self
    }

    /// Minimum spacing before `POST`/`PUT`/`PATCH`/`DELETE` requests
    #[must_use]
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.config.write_delay = delay;
        self
    }

    /// `false` runs at most one request at a time on this client
    #[must_use]
    pub fn parallel_requests(mut self, parallel: bool) -> Self {
        self.config.parallel_requests = parallel;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// `0` disables retry
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Replace the set of status codes that trigger a retry
    #[must_use]
    pub fn retryable_errors(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.config.retryable_errors = statuses.into_iter().collect();
        self
    }

    /// Retry `403`/`429` responses carrying `Retry-After`, waiting the advertised
    /// time (at most `max_wait`) in place of `retry_delay`. Resends count
    /// against `max_retries`.
    #[must_use]
    pub fn honor_retry_after(mut self, max_wait: Duration) -> Self {
        self.config.honor_retry_after = true;
        self.config.max_retry_after = max_wait;
        self
    }

    /// Add a preview media type to the `Accept` header
    #[must_use]
    pub fn preview(mut self, media_type: impl Into<String>) -> Self {
        self.config.previews.push(media_type.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Deadline spanning every attempt and retry delay
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// Tower's `Buffer` panics on zero, so the capacity is clamped to 1.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// `None` keeps idle connections indefinitely
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the client with the full layer stack.
    ///
    /// Must be called inside a Tokio runtime: the buffer worker is spawned here.
    ///
    /// # Errors
    /// Returns `HttpError::Config` for an invalid configuration and
    /// `HttpError::Tls` if the TLS configuration cannot be built.
    pub fn build(self) -> Result<GithubClient, HttpError> {
        let config = self.config;
        config.validate()?;

        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "github_transport::security",
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }
        if config.insecure {
            tracing::warn!(
                target: "github_transport::security",
                "TLS certificate verification disabled; any server certificate is accepted"
            );
        }

        let timeout = config.request_timeout;
        let https = build_https_connector(config.insecure, config.tls_roots, config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout needs a timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        // Stack, outer to inner:
        //   Buffer -> Retry -> HeaderInjection -> RateLimit -> ConditionalCache
        //   -> [BearerAuth] -> Timeout -> Decompression -> hyper client
        //
        // Bearer sits beneath the cache so revalidations and retries carry
        // the token. The cache sees decompressed bodies.
        let mut service: InnerService = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone();

        if let Some(token) = config.token.as_ref().filter(|t| !t.is_empty()) {
            service = BearerAuthLayer::new(token.clone()).layer(service).boxed_clone();
        }

        let mut cache = None;
        if config.cache.enabled {
            let layer = ConditionalCacheLayer::new(&config.cache);
            cache = Some(layer.cache());
            service = layer.layer(service).boxed_clone();
        }

        service = RateLimitLayer::new(config.rate_limit_config())
            .layer(service)
            .boxed_clone();

        let mut headers = HeaderInjectionLayer::new().default_header("user-agent", &config.user_agent)?;
        for media_type in config.accept_media_types() {
            headers = headers.merge("accept", &media_type)?;
        }
        service = headers.layer(service).boxed_clone();

        if config.max_retries > 0 || config.total_timeout.is_some() {
            service = RetryLayer::with_total_timeout(config.retry_config(), config.total_timeout)
                .layer(service)
                .boxed_clone();
        }

        let buffered: BufferedService = Buffer::new(service, config.buffer_capacity.max(1));

        Ok(GithubClient {
            service: buffered,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
            cache,
        })
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError`, keeping the attempt timeout in `Timeout`.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::from_transport(other),
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// HTTPS connector for the base transport.
///
/// `insecure` replaces certificate verification entirely, so `tls_roots` is
/// ignored in that case. ALPN offers both h2 and http/1.1.
fn build_https_connector(
    insecure: bool,
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = if insecure {
        let client_config =
            tls::insecure_client_config().map_err(|e| HttpError::Tls(Box::new(e)))?;
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
    } else {
        match tls_roots {
            TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::get_crypto_provider())
                .map_err(|e| HttpError::Tls(Box::new(e)))?,
            TlsRootConfig::Native => {
                let client_config =
                    tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
            }
        }
    };

    let connector = if transport == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
