use crate::response::parse_retry_after;
use crate::secret::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("github-transport/", env!("CARGO_PKG_VERSION"));

/// Media type requested on every call unless the caller asks for something else
pub const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Upper bound for a single cached body (default for [`CacheConfig::max_entry_bytes`])
pub const DEFAULT_MAX_CACHE_ENTRY_BYTES: usize = 4 * 1024 * 1024;

/// Whether a method mutates server state and is paced with the write delay.
///
/// `POST`, `PUT`, `PATCH` and `DELETE` are writes; every other method is a read.
#[must_use]
pub fn is_write_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::POST | http::Method::PUT | http::Method::PATCH | http::Method::DELETE
    )
}

/// Whether responses to this method may be stored by the conditional cache.
#[must_use]
pub fn is_cacheable_method(method: &http::Method) -> bool {
    matches!(*method, http::Method::GET | http::Method::HEAD)
}

/// Retry policy: a fixed delay between attempts and a set of retryable statuses.
///
/// Immutable once a client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (0 = no retries)
    ///
    /// Total attempts = 1 (initial) + `max_retries`
    pub max_retries: usize,

    /// Fixed wait between attempts
    pub delay: Duration,

    /// Status codes treated as transient
    pub retryable_statuses: HashSet<u16>,

    /// Retry 403/429 responses carrying `Retry-After`, waiting the advertised
    /// time instead of `delay`
    pub honor_retry_after: bool,

    /// Cap on a single `Retry-After` wait
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            retryable_statuses: default_retryable_statuses(),
            honor_retry_after: false,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create config with no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether a response with this status should be reissued.
    ///
    /// Success and `304 Not Modified` are final regardless of the configured set.
    #[must_use]
    pub fn should_retry_status(&self, status: http::StatusCode) -> bool {
        if status.is_success() || status == http::StatusCode::NOT_MODIFIED {
            return false;
        }
        self.retryable_statuses.contains(&status.as_u16())
    }

    /// Wait advertised by a secondary rate-limit response, capped by
    /// `max_retry_after`. `None` unless `honor_retry_after` is set and the
    /// response is a 403/429 with a parseable `Retry-After`.
    #[must_use]
    pub fn retry_after_wait(
        &self,
        status: http::StatusCode,
        headers: &http::HeaderMap,
    ) -> Option<Duration> {
        if !self.honor_retry_after {
            return None;
        }
        if status != http::StatusCode::FORBIDDEN && status != http::StatusCode::TOO_MANY_REQUESTS {
            return None;
        }
        parse_retry_after(headers).map(|wait| wait.min(self.max_retry_after))
    }
}

fn default_retryable_statuses() -> HashSet<u16> {
    HashSet::from([500, 502, 503, 504])
}

/// Request pacing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum spacing before a read request
    pub read_delay: Duration,

    /// Minimum spacing before a write request
    pub write_delay: Duration,

    /// `false` serializes every request on the client through one lock
    pub parallel_requests: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read_delay: Duration::ZERO,
            write_delay: Duration::from_secs(1),
            parallel_requests: false,
        }
    }
}

impl RateLimitConfig {
    /// No pacing, no serialization
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            parallel_requests: true,
            ..Default::default()
        }
    }

    /// The delay owed before a request with this method
    #[must_use]
    pub fn delay_for(&self, method: &http::Method) -> Duration {
        if is_write_method(method) {
            self.write_delay
        } else {
            self.read_delay
        }
    }
}

/// Conditional-request cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Attach validators and replay cached bodies on `304 Not Modified`
    pub enabled: bool,

    /// Bodies announced larger than this are streamed through and not stored
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entry_bytes: DEFAULT_MAX_CACHE_ENTRY_BYTES,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether plain `http://` URLs are accepted. Certificate verification
/// is governed separately by [`TransportConfig::insecure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    AllowInsecureHttp,
}

/// Options consumed from the provider configuration.
///
/// Durations are written as human-readable strings (`"1s"`, `"250ms"`).
///
/// ```ignore
/// let config: TransportConfig = serde_json::from_value(json!({
///     "token": "ghp_xxx",
///     "write_delay": "1s",
///     "max_retries": 2,
///     "retryable_errors": [500, 502],
/// }))?;
/// let client = TransportBuilder::with_config(config).build()?;
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Skip TLS certificate verification on the base transport
    pub insecure: bool,

    /// Accept plain `http://` URLs
    pub transport: TransportSecurity,

    /// Root store used when certificates are verified
    pub tls_roots: TlsRootConfig,

    /// Bearer token; `None` builds an anonymous client
    pub token: Option<SecretString>,

    /// Minimum spacing before a read request
    #[serde(with = "humantime_serde")]
    pub read_delay: Duration,

    /// Minimum spacing before a write request
    #[serde(with = "humantime_serde")]
    pub write_delay: Duration,

    /// `false` fully serializes requests on this client
    pub parallel_requests: bool,

    /// Fixed wait between retry attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// `0` disables retry; otherwise the upper bound on re-attempts
    pub max_retries: usize,

    /// Status codes eligible for retry
    pub retryable_errors: HashSet<u16>,

    /// Retry 403/429 responses after their `Retry-After` wait
    pub honor_retry_after: bool,

    /// Cap on a single `Retry-After` wait
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,

    /// Preview media types merged into the `Accept` header
    pub previews: Vec<String>,

    /// User-Agent header value, set when the caller did not supply one
    pub user_agent: String,

    /// Per-attempt timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Deadline spanning all attempts and retry delays
    #[serde(with = "humantime_serde")]
    pub total_timeout: Option<Duration>,

    /// Maximum response body size in bytes for the body readers
    pub max_body_size: usize,

    /// Conditional-request cache
    pub cache: CacheConfig,

    /// Queue depth in front of the middleware stack
    pub buffer_capacity: usize,

    /// Idle pooled connections are closed after this long
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            insecure: false,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            token: None,
            read_delay: Duration::ZERO,
            write_delay: Duration::from_secs(1),
            parallel_requests: false,
            retry_delay: Duration::from_secs(1),
            max_retries: 3,
            retryable_errors: default_retryable_statuses(),
            honor_retry_after: false,
            max_retry_after: Duration::from_secs(60),
            previews: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024, // 10 MB
            cache: CacheConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Configuration for tests against local mock servers.
    ///
    /// Allows plain HTTP, removes pacing, and retries without delay.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            transport: TransportSecurity::AllowInsecureHttp,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            parallel_requests: true,
            retry_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }

    /// Retry policy derived from the retry and `Retry-After` options
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            delay: self.retry_delay,
            retryable_statuses: self.retryable_errors.clone(),
            honor_retry_after: self.honor_retry_after,
            max_retry_after: self.max_retry_after,
        }
    }

    /// Pacing policy derived from the delay and serialization options
    #[must_use]
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            read_delay: self.read_delay,
            write_delay: self.write_delay,
            parallel_requests: self.parallel_requests,
        }
    }

    /// Headers merged into every request: the GitHub media type plus previews
    #[must_use]
    pub fn accept_media_types(&self) -> Vec<String> {
        std::iter::once(GITHUB_MEDIA_TYPE.to_owned())
            .chain(self.previews.iter().cloned())
            .collect()
    }

    /// Reject values that cannot produce a working client.
    ///
    /// # Errors
    /// Returns `HttpError::Config` for status codes outside `100..=599`,
    /// a zero `buffer_capacity`, or an empty `user_agent`.
    pub fn validate(&self) -> Result<(), crate::HttpError> {
        if let Some(code) = self
            .retryable_errors
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(crate::HttpError::Config(format!(
                "retryable_errors contains invalid HTTP status {code}"
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(crate::HttpError::Config(
                "buffer_capacity must be at least 1".to_owned(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(crate::HttpError::Config(
                "user_agent must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}
