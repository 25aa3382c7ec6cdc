//! Terminal-handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A [`Chain`](crate::Chain) runs handlers of many different concrete types,
//! so each one is erased behind `dyn ErasedHandler` and shared as an `Arc`.
//!
//! ```text
//! async fn get_quiz(req: Request) -> Result<Json<Quiz>, Error> { … }  ← user writes this
//!        ↓ chain.execute(req, get_quiz)
//! get_quiz.into_boxed_handler()                   ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_quiz))                   ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  when the cursor reaches it   ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_quiz(req).await.map(IntoResponse::into_response) })
//! ```
//!
//! Handlers report failures by returning `Err`. They never build error
//! responses themselves; the boundary does that uniformly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls it in place; `Send` so tokio may
/// move it between worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Result<Response, Error>>;
}

/// A type-erased handler, shared by every layer of one dispatch cycle.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid terminal handler.
///
/// You never implement this yourself. It is satisfied by any async function
/// or closure with the signature:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, Error>
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Result<Response, Error>> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}
