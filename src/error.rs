//! Unified error type.
//!
//! Handlers and middlewares raise an [`Error`] instead of building error
//! responses themselves. The [`Boundary`](crate::Boundary) is the only place
//! an `Error` turns into a response, so every endpoint fails the same way.

use std::fmt;

use http::StatusCode;

use crate::validate::FieldErrors;

/// The error type raised by handlers and middlewares.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input did not satisfy its schema. User-correctable.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// A resource does not exist. `resource` is interpolated into the message.
    #[error("{}", not_found_message(.resource.as_deref()))]
    NotFound { resource: Option<String> },

    /// Credentials are missing or invalid.
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials are valid but do not grant access.
    #[error("{0}")]
    Forbidden(String),

    /// An expected-but-fatal condition inside the service.
    #[error("internal error: {0}")]
    Internal(String),

    /// A middleware invoked a continuation twice, or one captured from an
    /// earlier layer. Always a defect in the middleware, never bad input.
    #[error("middleware re-entrancy: layer {index} entered after layer {reached} was reached")]
    Reentrancy { index: usize, reached: usize },

    /// Any other failure. Classified as unknown by the boundary.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: Some(resource.into()) }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps an arbitrary error as an unclassified failure.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }

    /// The classification the boundary applies to this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Internal(_) | Self::Reentrancy { .. } => ErrorKind::Internal,
            Self::Other(_) => ErrorKind::Unknown,
        }
    }
}

impl From<FieldErrors> for Error {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::other(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::other(e)
    }
}

fn not_found_message(resource: Option<&str>) -> String {
    match resource {
        Some(name) => format!("{name} not found"),
        None => "Resource not found".to_owned(),
    }
}

// ── ErrorKind ─────────────────────────────────────────────────────────────────

/// Failure categories understood by the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Internal,
    /// Unclassified errors and panic payloads.
    Unknown,
}

impl ErrorKind {
    /// Machine-readable code written to `error.code` in the envelope.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Internal | Self::Unknown => "INTERNAL_ERROR",
        }
    }

    /// Status used when no override is configured.
    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Internal | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_interpolates_resource() {
        assert_eq!(Error::not_found("Quiz").to_string(), "Quiz not found");
        assert_eq!(Error::NotFound { resource: None }.to_string(), "Resource not found");
    }

    #[test]
    fn reentrancy_is_internal() {
        let err = Error::Reentrancy { index: 2, reached: 3 };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.kind().code(), "INTERNAL_ERROR");
    }

    #[test]
    fn foreign_errors_are_unknown() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(parse);
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.kind().default_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ErrorKind::Validation.default_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.default_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.default_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.default_status(), StatusCode::NOT_FOUND);
    }
}
