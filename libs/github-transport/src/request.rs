use crate::client::{BufferedService, map_buffer_error};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::Request;
use http_body_util::Full;
use serde::Serialize;
use tower::{Service, ServiceExt};

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Json(Bytes),
}

/// Fluent request builder created by [`GithubClient`](crate::GithubClient).
///
/// Header and serialization errors are deferred until [`send`](Self::send).
///
/// ```ignore
/// let issue: Issue = client
///     .post("https://api.github.com/repos/o/r/issues")
///     .json(&NewIssue { title: "flaky test" })?
///     .send()
///     .await?
///     .json()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    method: http::Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        method: http::Method,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: Vec::new(),
            body: BodyKind::Empty,
            error: None,
            transport_security,
        }
    }

    /// Add a header. Repeated names are sent as repeated header lines.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none() {
            self.push_header(name, value);
        }
        self
    }

    /// Add several headers; the first invalid pair stops the rest.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            if self.error.is_some() {
                break;
            }
            self.push_header(name.as_ref(), value.as_ref());
        }
        self
    }

    fn push_header(&mut self, name: &str, value: &str) {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
    }

    /// Serialize `body` as JSON; `Content-Type: application/json` is added
    /// unless the caller set one.
    ///
    /// # Errors
    ///
    /// Returns a deferred header error or `HttpError::Json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.body = BodyKind::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    pub fn body_bytes(mut self, body: Bytes) -> Self {
        self.body = BodyKind::Bytes(body);
        self
    }

    pub fn body_string(mut self, body: String) -> Self {
        self.body = BodyKind::Bytes(Bytes::from(body));
        self
    }

    /// Parse the URL and check its scheme against the transport security mode.
    fn validate_url(&self) -> Result<http::Uri, HttpError> {
        let invalid = |kind, reason: String| HttpError::InvalidUri {
            url: self.url.clone(),
            kind,
            reason,
        };

        let uri: http::Uri = self
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))?;

        if uri.authority().is_none() {
            return Err(invalid(
                InvalidUriKind::MissingAuthority,
                "missing host/authority".to_owned(),
            ));
        }

        match (uri.scheme_str(), self.transport_security) {
            (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
            (Some("http"), TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            (Some(scheme), _) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            (None, _) => Err(invalid(InvalidUriKind::MissingScheme, "missing scheme".to_owned())),
        }
    }

    /// Send the request through the transport chain.
    ///
    /// Any HTTP status is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` for deferred build errors, a rejected URL, or a
    /// transport/TLS/timeout failure that outlived the retry policy.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri = self.validate_url()?;
        let mut builder = Request::builder().method(self.method).uri(uri);

        let has_content_type = self
            .headers
            .iter()
            .any(|(name, _)| name == http::header::CONTENT_TYPE);
        if !has_content_type && matches!(self.body, BodyKind::Json(_)) {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        let body = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Json(b) => b,
        };
        let request = builder.body(Full::new(body))?;

        let inner = self
            .service
            .ready()
            .await
            .map_err(map_buffer_error)?
            .call(request)
            .await
            .map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}
