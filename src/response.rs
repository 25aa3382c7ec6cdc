//! Outgoing response type, the response envelope, and [`IntoResponse`].
//!
//! Every response the pipeline produces for an API call is a JSON
//! [`Envelope`]:
//!
//! ```json
//! { "success": true,  "data": { "id": "abc" } }
//! { "success": false, "error": { "code": "NOT_FOUND", "message": "Quiz not found" } }
//! ```
//!
//! Handlers usually return [`Json`], which wraps the value as `data` of a
//! successful envelope. Failures are never built by hand in handlers: raise
//! an [`Error`](crate::Error) and the boundary renders it.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

const JSON: &str = "application/json";

// Used when an envelope cannot be serialized at all.
const FALLBACK_BODY: &str =
    r#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"Internal server error"}}"#;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The wire shape shared by every success and failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The `error` member of a failed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, message: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope {
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody { code: code.into(), message: message.into(), details: None }),
            message: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.details = Some(details);
        }
        self
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// An outgoing response.
///
/// ```rust
/// use http::StatusCode;
/// use serde_json::json;
/// use strata::{Envelope, Response};
///
/// Response::ok(json!({ "id": "abc" }));
/// Response::envelope(StatusCode::CREATED, &Envelope::success(json!({ "id": "q-9" })));
/// Response::failure(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authorization required");
/// Response::builder().status(StatusCode::NO_CONTENT).no_body();
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// `200 OK` with `data` wrapped in a successful envelope.
    pub fn ok<T: Serialize>(data: T) -> Self {
        Self::envelope(StatusCode::OK, &Envelope::success(data))
    }

    /// A failed envelope with no details.
    pub fn failure(status: StatusCode, code: &str, message: &str) -> Self {
        Self::envelope(status, &Envelope::failure(code, message))
    }

    /// Serializes `envelope` as the JSON body.
    ///
    /// Serialization cannot fail for well-formed data; if it does, the result
    /// is a generic 500 envelope rather than a panic.
    pub fn envelope<T: Serialize>(status: StatusCode, envelope: &Envelope<T>) -> Self {
        match serde_json::to_vec(envelope) {
            Ok(body) => Self::builder().status(status).json(body),
            Err(e) => {
                error!(error = %e, "failed to serialize response envelope");
                Self::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(FALLBACK_BODY.as_bytes().to_vec())
            }
        }
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Mutable headers, for middlewares decorating a downstream response.
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Decodes the body, typically into an [`Envelope`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Hands the response to the host framework.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(mut self, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        Response { status: self.status, headers: self.headers, body: body.into() }
    }

    /// Terminate with a plain-text body.
    pub fn text(mut self, body: impl Into<String>) -> Response {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Response { status: self.status, headers: self.headers, body: Bytes::from(body.into()) }
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`], for handler success values.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Return a bare status: `Ok(StatusCode::NO_CONTENT)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for () {
    fn into_response(self) -> Response { Response::status(StatusCode::NO_CONTENT) }
}

/// Serializable data, sent as `data` of a successful envelope.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        Response::ok(self.0)
    }
}

/// `(StatusCode::CREATED, Json(quiz))`.
impl<T: Serialize> IntoResponse for (StatusCode, Json<T>) {
    fn into_response(self) -> Response {
        Response::envelope(self.0, &Envelope::success(self.1.0))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_envelope_shape() {
        let res = Json(json!({ "id": "abc" })).into_response();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some(JSON));
        let body: Value = res.json().unwrap();
        assert_eq!(body, json!({ "success": true, "data": { "id": "abc" } }));
    }

    #[test]
    fn failure_envelope_omits_empty_members() {
        let res = Response::failure(StatusCode::FORBIDDEN, "FORBIDDEN", "Requires role admin");
        let body: Value = res.json().unwrap();
        assert_eq!(
            body,
            json!({ "success": false, "error": { "code": "FORBIDDEN", "message": "Requires role admin" } })
        );
    }

    #[test]
    fn envelope_round_trips_through_typed_decode() {
        let envelope = Envelope::failure("VALIDATION_ERROR", "Validation failed")
            .with_details(json!({ "title": ["is required"] }));
        let res = Response::envelope(StatusCode::UNPROCESSABLE_ENTITY, &envelope);
        let decoded: Envelope = res.json().unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn created_tuple_and_message() {
        let res = (StatusCode::CREATED, Json(json!({ "id": "q-1" }))).into_response();
        assert_eq!(res.status_code(), StatusCode::CREATED);

        let envelope = Envelope::success(1).with_message("Bookmark added");
        let body: Value = Response::envelope(StatusCode::OK, &envelope).json().unwrap();
        assert_eq!(body["message"], "Bookmark added");
    }

    #[test]
    fn non_serializable_data_falls_back_to_500() {
        use std::collections::HashMap;
        // Maps with non-string keys are rejected by serde_json.
        let mut data = HashMap::new();
        data.insert((1, 2), "pair");
        let res = Response::ok(data);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.error.unwrap().code, "INTERNAL_ERROR");
    }

    #[test]
    fn into_inner_keeps_status_and_headers() {
        let res = Response::builder()
            .status(StatusCode::ACCEPTED)
            .header("x-request-id", "r-9")
            .text("queued")
            .into_inner();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.headers()["x-request-id"], "r-9");
    }
}
