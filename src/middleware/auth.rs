use std::collections::{BTreeSet, HashMap};
use std::fmt;

use http::StatusCode;
use tracing::debug;

use super::{BoxFuture, Middleware, Next};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

const AUTHORIZATION_REQUIRED: &str = "Authorization required";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// The authenticated caller, attached to the request by [`BearerAuth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into(), roles: BTreeSet::new() }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Resolves a bearer token to an identity.
///
/// `None` means the token is unknown, expired or otherwise unacceptable.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<Identity>>;
}

/// A fixed token table. Handy for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Identity>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl TokenVerifier for StaticTokens {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<Identity>> {
        Box::pin(async move { self.tokens.get(token).cloned() })
    }
}

/// Requires an `Authorization: Bearer <token>` header.
///
/// - no bearer credential: answers 401 `"Authorization required"` itself,
///   without running the rest of the chain
/// - a token the verifier rejects: fails with [`Error::Unauthorized`]
/// - otherwise the resolved [`Identity`] is attached for downstream layers
pub struct BearerAuth<V> {
    verifier: V,
}

impl<V: TokenVerifier> BearerAuth<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }
}

impl<V> fmt::Debug for BearerAuth<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl<V: TokenVerifier> Middleware for BearerAuth<V> {
    fn name(&self) -> &str {
        "bearer-auth"
    }

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let Some(token) = request.bearer_token() else {
                return Ok(Response::failure(
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    AUTHORIZATION_REQUIRED,
                ));
            };
            let identity = self
                .verifier
                .verify(token)
                .await
                .ok_or_else(|| Error::unauthorized(INVALID_TOKEN))?;

            debug!(subject = %identity.subject, "authenticated");
            Ok(next.run(request.with_extension(identity)).await)
        })
    }
}

/// Lets through only identities holding `role`.
///
/// Must sit below [`BearerAuth`] in the chain.
#[derive(Debug, Clone)]
pub struct RequireRole {
    role: String,
}

impl RequireRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Middleware for RequireRole {
    fn name(&self) -> &str {
        "require-role"
    }

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let identity = request
                .extension::<Identity>()
                .ok_or_else(|| Error::unauthorized(AUTHORIZATION_REQUIRED))?;
            if !identity.has_role(&self.role) {
                return Err(Error::forbidden(format!("Requires role {}", self.role)));
            }
            Ok(next.run(request).await)
        })
    }
}
