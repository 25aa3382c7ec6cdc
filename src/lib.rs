//! # strata
//!
//! The request pipeline of a JSON API, minus the transport.
//!
//! ## The contract
//!
//! Your HTTP server accepts connections and routes paths. strata takes over
//! once a route is chosen and owns three things:
//!
//! - **Middleware chain**: onion-model dispatch around one terminal handler
//! - **Validation**: declarative [`Schema`](validate::Schema)s with every
//!   violation collected per field
//! - **Error boundary**: every failure, returned or panicked, becomes one
//!   uniform envelope and status
//!
//! Every response body has the same shape:
//!
//! ```json
//! { "success": false, "error": { "code": "NOT_FOUND", "message": "Quiz not found" } }
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{Chain, Config, Error, Json, Request};
//! use strata::middleware::{BearerAuth, Identity, RequestLog, StaticTokens};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata::ConfigError> {
//!     let config = Config::from_env()?;
//!     let tokens = StaticTokens::new().with("secret", Identity::new("alice"));
//!
//!     let chain = Chain::from_config(&config)
//!         .with(RequestLog::from_config(&config))
//!         .with(BearerAuth::new(tokens));
//!
//!     let req = Request::default().with_header("authorization", "Bearer secret");
//!     let res = chain.execute(req, get_quiz).await;
//!     println!("{} {}", res.status_code(), String::from_utf8_lossy(res.body()));
//!     Ok(())
//! }
//!
//! async fn get_quiz(_req: Request) -> Result<Json<serde_json::Value>, Error> {
//!     Err(Error::not_found("Quiz"))
//! }
//! ```

mod boundary;
mod chain;
mod config;
mod error;
mod handler;
mod request;
mod response;

pub mod health;
pub mod log;
pub mod middleware;
pub mod validate;

pub use boundary::{Boundary, Classification, Failure};
pub use chain::{Chain, Next};
pub use config::{Config, ConfigError};
pub use error::{Error, ErrorKind};
pub use handler::Handler;
pub use request::Request;
pub use response::{Envelope, ErrorBody, IntoResponse, Json, Response, ResponseBuilder};
