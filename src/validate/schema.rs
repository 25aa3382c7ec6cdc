//! Closed set of schema variants and the rules each one checks.
//!
//! A schema is built once with the fluent constructors on [`Schema`] and is
//! read-only afterwards; any number of validations can share one instance.
//!
//! ```rust
//! use strata::validate::Schema;
//!
//! let quiz = Schema::object()
//!     .field("title", Schema::string().min_len(3).max_len(120))
//!     .field("questions", Schema::array(Schema::object()
//!         .field("prompt", Schema::string().non_blank())
//!         .field("points", Schema::integer().min(1.0).max(10.0)))
//!         .min_items(1))
//!     .optional("tags", Schema::array(Schema::string()));
//! # let _ = quiz;
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{FieldErrors, ROOT};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// Declarative description of one input value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Accepts any value, including `null`.
    Any,
    Boolean,
    String(StringSchema),
    Number(NumberSchema),
    Array(ArraySchema),
    Object(ObjectSchema),
}

impl Schema {
    pub fn any() -> Self {
        Self::Any
    }

    pub fn boolean() -> Self {
        Self::Boolean
    }

    pub fn string() -> StringSchema {
        StringSchema::default()
    }

    pub fn number() -> NumberSchema {
        NumberSchema::default()
    }

    /// A number that must have no fractional part.
    pub fn integer() -> NumberSchema {
        NumberSchema { integer: true, ..NumberSchema::default() }
    }

    pub fn array(items: impl Into<Schema>) -> ArraySchema {
        ArraySchema { items: Box::new(items.into()), min_items: None, max_items: None }
    }

    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    /// Collects configuration mistakes: inverted bounds, bad patterns,
    /// duplicate field names. An empty list means the schema is usable.
    pub(crate) fn lint(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.lint_at(None, &mut problems);
        problems
    }

    fn lint_at(&self, path: Option<&str>, problems: &mut Vec<String>) {
        let here = at(path);
        match self {
            Self::Any | Self::Boolean => {}
            Self::String(s) => {
                if let (Some(min), Some(max)) = (s.min_len, s.max_len) {
                    if min > max {
                        problems.push(format!("{here}: min_len {min} exceeds max_len {max}"));
                    }
                }
                if let Some(Pattern { source, compiled: None }) = &s.pattern {
                    problems.push(format!("{here}: invalid pattern `{source}`"));
                }
            }
            Self::Number(n) => {
                for bound in [n.min, n.max].into_iter().flatten() {
                    if !bound.is_finite() {
                        problems.push(format!("{here}: bound {bound} is not finite"));
                    }
                }
                if let (Some(min), Some(max)) = (n.min, n.max) {
                    if min > max {
                        problems.push(format!("{here}: min {min} exceeds max {max}"));
                    }
                }
            }
            Self::Array(a) => {
                if let (Some(min), Some(max)) = (a.min_items, a.max_items) {
                    if min > max {
                        problems.push(format!("{here}: min_items {min} exceeds max_items {max}"));
                    }
                }
                a.items.lint_at(Some(&item_path(path, 0)), problems);
            }
            Self::Object(o) => {
                for (i, field) in o.fields.iter().enumerate() {
                    if o.fields[..i].iter().any(|f| f.name == field.name) {
                        problems.push(format!("{here}: duplicate field `{}`", field.name));
                    }
                    field.schema.lint_at(Some(&field_path(path, &field.name)), problems);
                }
            }
        }
    }

    /// Records every violation of `value` under `path`.
    pub(crate) fn check(&self, value: &Value, path: Option<&str>, errors: &mut FieldErrors) {
        if value.is_null() && !matches!(self, Self::Any) {
            errors.add(at(path), "is required");
            return;
        }
        match self {
            Self::Any => {}
            Self::Boolean => {
                if !value.is_boolean() {
                    errors.add(at(path), "must be a boolean");
                }
            }
            Self::String(s) => s.check(value, path, errors),
            Self::Number(n) => n.check(value, path, errors),
            Self::Array(a) => a.check(value, path, errors),
            Self::Object(o) => o.check(value, path, errors),
        }
    }
}

// `None` is the value passed to `validate` itself.
fn at(path: Option<&str>) -> &str {
    path.unwrap_or(ROOT)
}

fn field_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_owned(),
    }
}

fn item_path(parent: Option<&str>, index: usize) -> String {
    match parent {
        Some(parent) => format!("{parent}[{index}]"),
        None => format!("[{index}]"),
    }
}

// ── String ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    // None when `source` failed to compile; reported by lint.
    compiled: Option<Regex>,
}

#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<Pattern>,
    email: bool,
    non_blank: bool,
    one_of: Vec<String>,
}

impl StringSchema {
    /// Minimum length in characters.
    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = Some(n);
        self
    }

    /// Maximum length in characters.
    pub fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    /// The value must match `pattern` somewhere; anchor it for a full match.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Pattern {
            source: pattern.to_owned(),
            compiled: Regex::new(pattern).ok(),
        });
        self
    }

    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }

    /// Rejects strings made only of whitespace.
    pub fn non_blank(mut self) -> Self {
        self.non_blank = true;
        self
    }

    pub fn one_of<I, S>(mut self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = allowed.into_iter().map(Into::into).collect();
        self
    }

    fn check(&self, value: &Value, path: Option<&str>, errors: &mut FieldErrors) {
        let Some(s) = value.as_str() else {
            errors.add(at(path), "must be a string");
            return;
        };
        let len = s.chars().count();
        if let Some(min) = self.min_len {
            if len < min {
                errors.add(at(path), format!("must be at least {min} characters"));
            }
        }
        if let Some(max) = self.max_len {
            if len > max {
                errors.add(at(path), format!("must be at most {max} characters"));
            }
        }
        if self.non_blank && s.trim().is_empty() {
            errors.add(at(path), "must not be blank");
        }
        if let Some(Pattern { source, compiled: Some(re) }) = &self.pattern {
            if !re.is_match(s) {
                errors.add(at(path), format!("must match pattern {source}"));
            }
        }
        if self.email && !EMAIL.is_match(s) {
            errors.add(at(path), "must be a valid email address");
        }
        if !self.one_of.is_empty() && !self.one_of.iter().any(|a| a == s) {
            errors.add(at(path), format!("must be one of: {}", self.one_of.join(", ")));
        }
    }
}

impl From<StringSchema> for Schema {
    fn from(s: StringSchema) -> Self {
        Self::String(s)
    }
}

// ── Number ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    integer: bool,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberSchema {
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    fn check(&self, value: &Value, path: Option<&str>, errors: &mut FieldErrors) {
        let Some(n) = value.as_f64() else {
            errors.add(at(path), if self.integer { "must be an integer" } else { "must be a number" });
            return;
        };
        if self.integer && n.fract() != 0.0 {
            errors.add(at(path), "must be an integer");
        }
        if let Some(min) = self.min {
            if n < min {
                errors.add(at(path), format!("must be at least {min}"));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                errors.add(at(path), format!("must be at most {max}"));
            }
        }
    }
}

impl From<NumberSchema> for Schema {
    fn from(n: NumberSchema) -> Self {
        Self::Number(n)
    }
}

// ── Array ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ArraySchema {
    items: Box<Schema>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl ArraySchema {
    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    fn check(&self, value: &Value, path: Option<&str>, errors: &mut FieldErrors) {
        let Some(items) = value.as_array() else {
            errors.add(at(path), "must be an array");
            return;
        };
        if let Some(min) = self.min_items {
            if items.len() < min {
                errors.add(at(path), format!("must contain at least {min} items"));
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                errors.add(at(path), format!("must contain at most {max} items"));
            }
        }
        for (i, item) in items.iter().enumerate() {
            self.items.check(item, Some(&item_path(path, i)), errors);
        }
    }
}

impl From<ArraySchema> for Schema {
    fn from(a: ArraySchema) -> Self {
        Self::Array(a)
    }
}

// ── Object ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Field {
    name: String,
    schema: Schema,
    required: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<Field>,
    deny_unknown: bool,
}

impl ObjectSchema {
    /// A field that must be present and non-null.
    pub fn field(mut self, name: &str, schema: impl Into<Schema>) -> Self {
        self.fields.push(Field { name: name.to_owned(), schema: schema.into(), required: true });
        self
    }

    /// A field that may be absent or null; checked when present.
    pub fn optional(mut self, name: &str, schema: impl Into<Schema>) -> Self {
        self.fields.push(Field { name: name.to_owned(), schema: schema.into(), required: false });
        self
    }

    /// Reports keys the schema does not declare.
    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    fn check(&self, value: &Value, path: Option<&str>, errors: &mut FieldErrors) {
        let Some(map) = value.as_object() else {
            errors.add(at(path), "must be an object");
            return;
        };
        for field in &self.fields {
            let child = field_path(path, &field.name);
            match map.get(&field.name) {
                None | Some(Value::Null) if !field.required => {}
                None => errors.add(child, "is required"),
                Some(v) => field.schema.check(v, Some(&child), errors),
            }
        }
        if self.deny_unknown {
            for key in map.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    errors.add(field_path(path, key), "is not allowed");
                }
            }
        }
    }
}

impl From<ObjectSchema> for Schema {
    fn from(o: ObjectSchema) -> Self {
        Self::Object(o)
    }
}
