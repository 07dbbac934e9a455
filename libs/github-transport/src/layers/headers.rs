use crate::error::HttpError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Header rules applied to every outgoing request.
#[derive(Debug, Clone, Default)]
struct HeaderRules {
    /// Set only when the request has no value for the name
    defaults: Vec<(HeaderName, HeaderValue)>,
    /// Comma-joined onto whatever the request already carries
    merged: Vec<(HeaderName, HeaderValue)>,
}

/// Tower layer that merges opt-in headers (e.g. preview media types) into
/// every request without clobbering caller-supplied values.
#[derive(Clone, Debug, Default)]
pub struct HeaderInjectionLayer {
    rules: Arc<HeaderRules>,
}

impl HeaderInjectionLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header that is appended to an existing value with `,`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for bad input.
    pub fn merge(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        let pair = parse_pair(name, value)?;
        Arc::make_mut(&mut self.rules).merged.push(pair);
        Ok(self)
    }

    /// Add a header that is only set when the request lacks one.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for bad input.
    pub fn default_header(mut self, name: &str, value: &str) -> Result<Self, HttpError> {
        let pair = parse_pair(name, value)?;
        Arc::make_mut(&mut self.rules).defaults.push(pair);
        Ok(self)
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    Ok((HeaderName::try_from(name)?, HeaderValue::try_from(value)?))
}

impl<S> Layer<S> for HeaderInjectionLayer {
    type Service = HeaderInjectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HeaderInjectionService {
            inner,
            rules: Arc::clone(&self.rules),
        }
    }
}

/// Service created by [`HeaderInjectionLayer`].
#[derive(Clone, Debug)]
pub struct HeaderInjectionService<S> {
    inner: S,
    rules: Arc<HeaderRules>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HeaderInjectionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in &self.rules.defaults {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.rules.merged {
            merge_header(headers, name, value);
        }
        self.inner.call(req)
    }
}

/// Append `value` to the existing header as a comma-separated list member.
///
/// Repeated header lines are folded into one. A value already listed is not
/// appended again, so injection is idempotent across retries.
fn merge_header(headers: &mut HeaderMap, name: &HeaderName, value: &HeaderValue) {
    let existing: Vec<&[u8]> = headers
        .get_all(name)
        .iter()
        .map(HeaderValue::as_bytes)
        .collect();

    if existing.is_empty() {
        headers.insert(name.clone(), value.clone());
        return;
    }

    let already_listed = existing.iter().any(|line| {
        line.split(|b| *b == b',')
            .any(|token| token.trim_ascii().eq_ignore_ascii_case(value.as_bytes()))
    });
    if already_listed && existing.len() == 1 {
        return;
    }

    let mut joined = existing.join(&b", "[..]);
    if !already_listed {
        joined.extend_from_slice(b", ");
        joined.extend_from_slice(value.as_bytes());
    }

    // Bytes came from valid header values joined by ", ", so this cannot fail
    if let Ok(mut merged) = HeaderValue::from_bytes(&joined) {
        merged.set_sensitive(value.is_sensitive());
        headers.insert(name.clone(), merged);
    }
}
