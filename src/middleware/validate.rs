use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{BoxFuture, Middleware, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::validate::{FieldErrors, Schema, SchemaSet, validate_batch};

const BODY: &str = "body";

/// Validated request inputs, attached by [`ValidateRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated(pub BTreeMap<String, Value>);

impl Validated {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn body(&self) -> Option<&Value> {
        self.get(BODY)
    }

    /// Deserializes the validated body.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.body().cloned().unwrap_or(Value::Null);
        Ok(T::deserialize(body)?)
    }
}

/// Validates the JSON body and selected headers before the handler runs.
///
/// All inputs are checked in one pass and every failure is reported
/// together, keyed `body` or by header name. On success the checked values
/// travel downstream as a [`Validated`] extension.
///
/// ```rust
/// use strata::middleware::ValidateRequest;
/// use strata::validate::Schema;
///
/// let create_quiz = ValidateRequest::new()
///     .body(Schema::object().field("title", Schema::string().non_blank()))
///     .header("x-tenant", Schema::string().min_len(1));
/// # let _ = create_quiz;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidateRequest {
    schemas: SchemaSet,
    headers: Vec<String>,
}

impl ValidateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, schema: impl Into<Schema>) -> Self {
        self.schemas.insert(BODY, schema);
        self
    }

    /// Adds a header check. A missing header is validated as `null`.
    pub fn header(mut self, name: &str, schema: impl Into<Schema>) -> Self {
        let name = name.to_ascii_lowercase();
        self.schemas.insert(name.as_str(), schema);
        self.headers.push(name);
        self
    }

    fn inputs(&self, request: &Request) -> Result<Map<String, Value>, Error> {
        let mut inputs = Map::new();
        if self.schemas.contains(BODY) {
            let body = request
                .json_value()
                .map_err(|_| Error::Validation(FieldErrors::single(BODY, "must be valid JSON")))?;
            inputs.insert(BODY.to_owned(), body);
        }
        for name in &self.headers {
            if let Some(value) = request.header(name) {
                inputs.insert(name.clone(), Value::String(value.to_owned()));
            }
        }
        Ok(inputs)
    }
}

impl Middleware for ValidateRequest {
    fn name(&self) -> &str {
        "validate-request"
    }

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let inputs = self.inputs(&request)?;
            let validated = validate_batch::<Value>(&self.schemas, &inputs).into_result()?;
            Ok(next.run(request.with_extension(Validated(validated))).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::response::{Envelope, Json};
    use crate::Chain;

    #[derive(Debug, Deserialize)]
    struct NewQuiz {
        title: String,
    }

    fn chain() -> Chain {
        Chain::new().with(
            ValidateRequest::new()
                .body(Schema::object().field("title", Schema::string().non_blank().max_len(40)))
                .header("X-Tenant", Schema::string().min_len(2)),
        )
    }

    async fn create(req: Request) -> Result<Json<String>, Error> {
        let validated = req.extension::<Validated>().ok_or_else(|| Error::internal("unvalidated"))?;
        let quiz: NewQuiz = validated.body_as()?;
        Ok(Json(quiz.title))
    }

    #[tokio::test]
    async fn valid_inputs_reach_the_handler() {
        let req = Request::default()
            .with_header("x-tenant", "acme")
            .with_json(&json!({ "title": "Lifetimes" }));
        let res = chain().execute(req, create).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.json::<Envelope>().unwrap().data.unwrap(), "Lifetimes");
    }

    #[tokio::test]
    async fn failures_are_reported_together() {
        let req = Request::default().with_json(&json!({ "title": "  " }));
        let res = chain().execute(req, create).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let details = res.json::<Envelope>().unwrap().error.unwrap().details.unwrap();
        assert_eq!(details["body"], json!(["title: must not be blank"]));
        assert_eq!(details["x-tenant"], json!(["is required"]));
    }

    #[tokio::test]
    async fn malformed_json_fails_fast() {
        let req = Request::default().with_header("x-tenant", "acme").with_body("{\"title\":");
        let res = chain().execute(req, create).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let details = res.json::<Envelope>().unwrap().error.unwrap().details.unwrap();
        assert_eq!(details, json!({ "body": ["must be valid JSON"] }));
    }
}
