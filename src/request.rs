//! Incoming request type.

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use serde_json::Value;

use crate::error::Error;
use crate::validate::{FieldErrors, ROOT};

/// An inbound request as the pipeline sees it.
///
/// A middleware receives the request by value. To hand something to the
/// layers below it (an authenticated identity, a validated body), it builds
/// the downstream request with [`Request::with_extension`]; the layers above
/// never observe that change.
#[derive(Debug, Default)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, ..Self::default() }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.extensions }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The token of an `Authorization: Bearer <token>` header.
    ///
    /// `None` when the header is missing; `Some("")` never happens, an empty
    /// or non-bearer credential yields `None` too.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }

    /// Parses the body as JSON. An empty body reads as `null`.
    pub fn json_value(&self) -> Result<Value, Error> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|_| Error::Validation(FieldErrors::single(ROOT, "body must be valid JSON")))
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    // ── Builders ──────────────────────────────────────────────────────────────

    /// Returns the request with `value` attached for downstream layers.
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching `content-type`.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }
}

/// Conversion from the host framework's request.
impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            extensions: parts.extensions,
        }
    }
}
