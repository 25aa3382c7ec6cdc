//! Error boundary.
//!
//! [`Boundary::handle`] is the single place where a failure becomes a
//! response. It is total: every [`Failure`] yields one envelope and one
//! status, and nothing it does can panic back into the chain.
//!
//! | Failure | Status | `error.code` | `error.message` |
//! |---|---|---|---|
//! | `NotFound { resource }` | 404 | `NOT_FOUND` | `"<resource> not found"` |
//! | `Unauthorized(msg)` | 401 | `UNAUTHORIZED` | `msg` |
//! | `Forbidden(msg)` | 403 | `FORBIDDEN` | `msg` |
//! | `Internal`, `Reentrancy` | 500 | `INTERNAL_ERROR` | generic |
//! | `Validation(fields)` | 400 or 422 | `VALIDATION_ERROR` | `"Validation failed"`, fields in `details` |
//! | `Other`, panics | 500 | `INTERNAL_ERROR` | generic |
//!
//! Internal detail (error text, panic payloads) goes to the [`Logger`] only.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use http::StatusCode;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::log::{Level, Logger, TracingLogger, emit};
use crate::response::{Envelope, Response};

const INTERNAL_MESSAGE: &str = "Internal server error";
const VALIDATION_MESSAGE: &str = "Validation failed";
const UNPRINTABLE_DETAIL: &str = "<error panicked while formatting>";

// ── Failure ───────────────────────────────────────────────────────────────────

/// Anything a layer can fail with.
pub enum Failure {
    /// A returned [`Error`].
    Error(Error),
    /// The payload of a panic caught inside a layer.
    Panic(Box<dyn Any + Send + 'static>),
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Error(e) => e.kind(),
            Self::Panic(_) => ErrorKind::Unknown,
        }
    }

    /// Full internal description, for logs only.
    fn detail(&self) -> String {
        match self {
            Self::Error(e) => {
                let mut detail = e.to_string();
                let mut source = std::error::Error::source(e);
                while let Some(cause) = source {
                    detail.push_str(": ");
                    detail.push_str(&cause.to_string());
                    source = cause.source();
                }
                detail
            }
            Self::Panic(payload) => format!("panic: {}", panic_message(&**payload)),
        }
    }
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Self::Error(e)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Self::Panic(payload) => {
                f.debug_tuple("Panic").field(&panic_message(&**payload)).finish()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// What the boundary decided for one failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

// ── Boundary ──────────────────────────────────────────────────────────────────

/// Maps failures onto the response envelope.
///
/// Cheap to clone; a [`Chain`](crate::Chain) hands a copy to every dispatch
/// cycle.
#[derive(Clone)]
pub struct Boundary {
    logger: Arc<dyn Logger>,
    validation_status: StatusCode,
}

impl Boundary {
    /// Logs through `tracing`, answers validation failures with 400.
    pub fn new() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            validation_status: ErrorKind::Validation.default_status(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_validation_status(config.validation_status())
    }

    pub fn with_logger(self, logger: impl Logger) -> Self {
        self.with_shared_logger(Arc::new(logger))
    }

    pub fn with_shared_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Status for validation failures: 400 or 422.
    ///
    /// Any other status is ignored with a warning and the current one kept.
    pub fn with_validation_status(mut self, status: StatusCode) -> Self {
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
            self.validation_status = status;
        } else {
            warn!(%status, "ignoring validation status other than 400 or 422");
        }
        self
    }

    pub fn validation_status(&self) -> StatusCode {
        self.validation_status
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Pure mapping from a failure to status, code, message and details.
    pub fn classify(&self, failure: &Failure) -> Classification {
        let kind = failure.kind();
        let (status, message, details) = match failure {
            Failure::Error(
                e @ (Error::NotFound { .. } | Error::Unauthorized(_) | Error::Forbidden(_)),
            ) => (kind.default_status(), e.to_string(), None),
            Failure::Error(Error::Internal(_) | Error::Reentrancy { .. }) => {
                (kind.default_status(), INTERNAL_MESSAGE.to_owned(), None)
            }
            Failure::Error(Error::Validation(fields)) => (
                self.validation_status,
                VALIDATION_MESSAGE.to_owned(),
                serde_json::to_value(fields).ok(),
            ),
            Failure::Error(Error::Other(_)) | Failure::Panic(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_owned(), None)
            }
        };
        Classification { status, code: kind.code(), message, details }
    }

    /// Renders `failure` as a response and reports it to the logger.
    pub fn handle(&self, failure: impl Into<Failure>) -> Response {
        let failure = failure.into();
        let Classification { status, code, message, details } = self.classify(&failure);

        let level = if status.is_server_error() { Level::ERROR } else { Level::WARN };
        // `detail` runs foreign Display impls.
        let detail = catch_unwind(AssertUnwindSafe(|| failure.detail()))
            .unwrap_or_else(|_| UNPRINTABLE_DETAIL.to_owned());
        let context = json!({
            "status": status.as_u16(),
            "code": code,
            "detail": detail,
        });
        emit(&*self.logger, level, "request failed", Some(&context));

        let mut envelope = Envelope::failure(code, message);
        if let Some(details) = details {
            envelope = envelope.with_details(details);
        }
        Response::envelope(status, &envelope)
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boundary")
            .field("validation_status", &self.validation_status)
            .finish_non_exhaustive()
    }
}
