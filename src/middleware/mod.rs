//! Middleware layer.
//!
//! Middleware wraps the terminal handler and is the right place for
//! cross-cutting concerns: request logging, authentication, input
//! validation. A middleware receives the request and a [`Next`]; it may
//! work before and after `next.run(req).await`, or skip `next` entirely and
//! answer on its own.
//!
//! ```rust
//! use strata::{Chain, Response};
//! use strata::middleware::{from_fn, Next};
//!
//! let chain = Chain::new().with(from_fn("request-id", |req, next: Next| async move {
//!     let mut res = next.run(req).await;
//!     res.headers_mut().insert("x-served-by", "strata".parse().unwrap());
//!     Ok(res)
//! }));
//! # let _ = chain;
//! ```
//!
//! Built-in middleware:
//! - [`RequestLog`]: one event per request with method, path, status, latency
//! - [`BearerAuth`]: resolves `Authorization: Bearer` to an [`Identity`]
//! - [`RequireRole`]: rejects identities lacking a role
//! - [`ValidateRequest`]: validates body and headers against schemas

mod auth;
mod logging;
mod validate;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub use auth::{BearerAuth, Identity, RequireRole, StaticTokens, TokenVerifier};
pub use logging::RequestLog;
pub use validate::{Validated, ValidateRequest};

pub use crate::chain::Next;
use crate::error::Error;
pub use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// One layer of a [`Chain`](crate::Chain).
///
/// Returning `Err` hands the failure to the boundary, which renders it at
/// this layer; outer layers see the rendered response.
pub trait Middleware: Send + Sync + 'static {
    /// Used in logs and [`Chain::names`](crate::Chain::names).
    fn name(&self) -> &str;

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>>;
}

/// A middleware shared between chains.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Builds a middleware from an async closure.
pub fn from_fn<F, Fut>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    FnMiddleware { name, f }
}

/// Middleware returned by [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin((self.f)(request, next))
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish_non_exhaustive()
    }
}
