//! Schema validation.
//!
//! [`validate`] turns untrusted JSON into a typed value or a per-field list
//! of messages. It never fails for bad input: a rejected input is an
//! ordinary [`ValidationResult::Failure`]. A broken schema is reported the
//! same way, as a single [`GENERAL`] entry, so callers always get a result.
//!
//! [`validate_batch`] checks several independently keyed inputs (body,
//! headers, …) and reports every failing key, not just the first.

mod schema;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::Error;

pub use schema::{ArraySchema, NumberSchema, ObjectSchema, Schema, StringSchema};

/// Key used for faults in the schema itself rather than in the input.
pub const GENERAL: &str = "_general";

/// Key used for violations of the root value (e.g. "must be an object").
pub const ROOT: &str = "_root";

const GENERAL_MESSAGE: &str = "Invalid validation schema";
const FALLBACK_MESSAGE: &str = "Invalid input";

// ── FieldErrors ───────────────────────────────────────────────────────────────

/// Field path → every message recorded for that field, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding one message for one field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every message prefixed with its field, root and general messages bare.
    fn flatten(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |m| match field {
                    ROOT | GENERAL => m.clone(),
                    _ => format!("{field}: {m}"),
                })
            })
            .collect()
    }
}

// ── ValidationResult ──────────────────────────────────────────────────────────

/// Outcome of a validation. Exactly one of data or errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult<T> {
    Success(T),
    Failure(FieldErrors),
}

impl<T> ValidationResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Success(_) => None,
            Self::Failure(errors) => Some(errors),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationResult<U> {
        match self {
            Self::Success(data) => ValidationResult::Success(f(data)),
            Self::Failure(errors) => ValidationResult::Failure(errors),
        }
    }

    /// Converts a failure into [`Error::Validation`] so it can be raised with `?`.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(errors) => Err(Error::Validation(errors)),
        }
    }
}

fn general_failure<T>() -> ValidationResult<T> {
    ValidationResult::Failure(FieldErrors::single(GENERAL, GENERAL_MESSAGE))
}

// ── validate ──────────────────────────────────────────────────────────────────

/// Checks `input` against `schema` and deserializes it into `T`.
///
/// ```rust
/// use serde::Deserialize;
/// use serde_json::json;
/// use strata::validate::{validate, Schema, ValidationResult};
///
/// #[derive(Deserialize)]
/// struct NewBookmark { quiz_id: String }
///
/// let schema = Schema::object().field("quiz_id", Schema::string().min_len(1)).into();
///
/// match validate::<NewBookmark>(&schema, &json!({ "quiz_id": "" })) {
///     ValidationResult::Success(_) => unreachable!(),
///     ValidationResult::Failure(errors) => {
///         assert_eq!(errors.get("quiz_id").unwrap(), ["must be at least 1 characters"]);
///     }
/// }
/// ```
pub fn validate<T: DeserializeOwned>(schema: &Schema, input: &Value) -> ValidationResult<T> {
    let problems = schema.lint();
    if !problems.is_empty() {
        error!(?problems, "schema is malformed");
        return general_failure();
    }

    let mut errors = FieldErrors::new();
    schema.check(input, None, &mut errors);
    if !errors.is_empty() {
        return ValidationResult::Failure(errors);
    }

    // Validated input that still does not fit `T` means schema and type disagree.
    match T::deserialize(input) {
        Ok(data) => ValidationResult::Success(data),
        Err(e) => {
            error!(error = %e, target_type = std::any::type_name::<T>(), "schema accepted input the target type rejects");
            general_failure()
        }
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Schemas keyed by input name, for [`validate_batch`].
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.insert(key, schema);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, schema: impl Into<Schema>) {
        self.schemas.insert(key.into(), schema.into());
    }

    pub fn get(&self, key: &str) -> Option<&Schema> {
        self.schemas.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Validates every keyed input against its schema without stopping at the
/// first failure.
///
/// - A schema key missing from `inputs` is validated against `null`.
/// - An input key with no schema is ignored and absent from the output.
/// - On failure each failing key maps to its own messages, flattened as
///   `"<field>: <message>"`.
pub fn validate_batch<T: DeserializeOwned>(
    schemas: &SchemaSet,
    inputs: &Map<String, Value>,
) -> ValidationResult<BTreeMap<String, T>> {
    for key in inputs.keys().filter(|k| !schemas.contains(k)) {
        debug!(key = %key, "ignoring input with no schema");
    }

    let mut data = BTreeMap::new();
    let mut failed = FieldErrors::new();

    for (key, schema) in &schemas.schemas {
        let input = inputs.get(key).unwrap_or(&Value::Null);
        match validate::<T>(schema, input) {
            ValidationResult::Success(value) => {
                data.insert(key.clone(), value);
            }
            ValidationResult::Failure(errors) => {
                let mut messages = errors.flatten();
                if messages.is_empty() {
                    messages.push(FALLBACK_MESSAGE.to_owned());
                }
                for message in messages {
                    failed.add(key.as_str(), message);
                }
            }
        }
    }

    if failed.is_empty() {
        ValidationResult::Success(data)
    } else {
        ValidationResult::Failure(failed)
    }
}
