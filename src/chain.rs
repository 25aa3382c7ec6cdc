//! Onion-model middleware chain.
//!
//! A [`Chain`] holds middlewares in declaration order. [`Chain::execute`]
//! runs them around a terminal handler:
//!
//! ```text
//!   request ─▶ A ─▶ B ─▶ C ─▶ handler
//!                                │
//!  response ◀─ A ◀─ B ◀─ C ◀─────┘
//! ```
//!
//! Each middleware gets a [`Next`] bound to the layer below it. Not calling
//! it short-circuits the chain; the middleware's own response is final.
//!
//! # The dispatch cursor
//!
//! Every `execute` call allocates a fresh cycle with a cursor recording the
//! highest layer index entered so far. Entering a layer at or below the
//! cursor (a continuation run twice, or a clone of a stale one) fails with
//! [`Error::Reentrancy`] instead of running anything downstream again. The
//! cursor lives only in the cycle, so concurrent requests never share it.
//!
//! # Failures
//!
//! A layer that returns `Err` or panics is handled by the [`Boundary`] in the
//! same dispatch call. The layer above receives a rendered response from
//! [`Next::run`], never an error, so each failure is rendered exactly once.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use futures_util::FutureExt;
use tracing::trace;

use crate::boundary::{Boundary, Failure};
use crate::config::Config;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::request::Request;
use crate::response::Response;

/// An ordered middleware stack plus the boundary that renders its failures.
///
/// Build it once at startup and share it; `execute` takes `&self`.
///
/// ```rust
/// use strata::{Chain, Error, Json, Request};
/// use strata::middleware::RequestLog;
///
/// # async fn run() {
/// let chain = Chain::new().with(RequestLog::new());
///
/// let res = chain
///     .execute(Request::default(), |_req: Request| async {
///         Ok::<_, Error>(Json(serde_json::json!({ "id": "abc" })))
///     })
///     .await;
/// assert_eq!(res.status_code(), 200);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    layers: Arc<Vec<BoxedMiddleware>>,
    boundary: Boundary,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty chain whose boundary follows `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new().with_boundary(Boundary::from_config(config))
    }

    /// Appends a middleware. Declaration order is execution order.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.push(middleware);
        self
    }

    /// Appends a middleware that is also used elsewhere.
    pub fn with_shared(mut self, middleware: BoxedMiddleware) -> Self {
        Arc::make_mut(&mut self.layers).push(middleware);
        self
    }

    pub fn push(&mut self, middleware: impl Middleware) {
        Arc::make_mut(&mut self.layers).push(Arc::new(middleware));
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Middleware names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Runs one request through every layer and `handler`.
    ///
    /// Always produces exactly one response: failures anywhere in the chain
    /// are rendered by the boundary.
    pub async fn execute(&self, request: Request, handler: impl Handler) -> Response {
        let cycle = Arc::new(Cycle {
            layers: Arc::clone(&self.layers),
            handler: handler.into_boxed_handler(),
            boundary: self.boundary.clone(),
            cursor: AtomicIsize::new(-1),
        });
        dispatch(cycle, 0, request).await
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("layers", &self.names())
            .field("boundary", &self.boundary)
            .finish()
    }
}

// ── Dispatch cycle ────────────────────────────────────────────────────────────

/// State private to one `execute` call.
struct Cycle {
    layers: Arc<Vec<BoxedMiddleware>>,
    handler: BoxedHandler,
    boundary: Boundary,
    /// Highest layer index entered; -1 before the first.
    cursor: AtomicIsize,
}

impl Cycle {
    /// Advances the cursor to `index`, or fails if it is already there or past.
    fn enter(&self, index: usize) -> Result<(), Error> {
        let target = index as isize;
        let reached = self.cursor.fetch_max(target, Ordering::AcqRel);
        if reached >= target {
            return Err(Error::Reentrancy { index, reached: reached as usize });
        }
        Ok(())
    }

    /// Runs layer `index`: a middleware, or the handler once past the last one.
    fn invoke(self: &Arc<Self>, index: usize, request: Request) -> BoxFuture<'_, Result<Response, Error>> {
        match self.layers.get(index) {
            Some(middleware) => {
                trace!(index, middleware = middleware.name(), "entering middleware");
                let next = Next { cycle: Arc::clone(self), index: index + 1 };
                middleware.call(request, next)
            }
            None => {
                trace!(index, "entering handler");
                self.handler.call(request)
            }
        }
    }
}

async fn dispatch(cycle: Arc<Cycle>, index: usize, request: Request) -> Response {
    let outcome = match cycle.enter(index) {
        Ok(()) => match AssertUnwindSafe(cycle.invoke(index, request)).catch_unwind().await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Failure::Error(e)),
            Err(payload) => Err(Failure::Panic(payload)),
        },
        Err(e) => Err(Failure::Error(e)),
    };
    outcome.unwrap_or_else(|failure| cycle.boundary.handle(failure))
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain, as seen from one middleware.
///
/// [`run`](Next::run) consumes it. A clone can be run again, but the second
/// entry into the same layer is rejected by the cycle's cursor and answered
/// with a 500 envelope; nothing downstream runs twice.
#[derive(Clone)]
pub struct Next {
    cycle: Arc<Cycle>,
    index: usize,
}

impl Next {
    /// Passes `request` to the next layer and resolves to its response.
    ///
    /// Failures below are already rendered; this never yields an error.
    pub fn run(self, request: Request) -> BoxFuture<'static, Response> {
        Box::pin(dispatch(self.cycle, self.index, request))
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use http::StatusCode;
    use serde_json::{Value, json};

    use super::*;
    use crate::middleware::from_fn;
    use crate::response::{Envelope, Json};

    type Trace = Arc<Mutex<Vec<String>>>;

    fn tracer(name: &'static str, trace: &Trace) -> impl Middleware {
        let trace = Arc::clone(trace);
        from_fn(name, move |req, next: Next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(format!("{name}-in"));
                let res = next.run(req).await;
                trace.lock().unwrap().push(format!("{name}-out"));
                Ok(res)
            }
        })
    }

    fn recording_handler(
        trace: &Trace,
    ) -> impl Fn(Request) -> BoxFuture<'static, Result<Json<Value>, Error>> + Send + Sync + 'static {
        let trace = Arc::clone(trace);
        move |_req: Request| {
            let trace = Arc::clone(&trace);
            Box::pin(async move {
                trace.lock().unwrap().push("H".to_owned());
                Ok(Json(json!({ "id": "abc" })))
            })
        }
    }

    #[tokio::test]
    async fn layers_run_in_onion_order() {
        let trace = Trace::default();
        let chain = Chain::new()
            .with(tracer("A", &trace))
            .with(tracer("B", &trace))
            .with(tracer("C", &trace));

        let res = chain.execute(Request::default(), recording_handler(&trace)).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *trace.lock().unwrap(),
            ["A-in", "B-in", "C-in", "H", "C-out", "B-out", "A-out"]
        );
    }

    #[tokio::test]
    async fn empty_chain_runs_only_the_handler() {
        let trace = Trace::default();
        let res = Chain::new().execute(Request::default(), recording_handler(&trace)).await;
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.data.unwrap(), json!({ "id": "abc" }));
        assert_eq!(*trace.lock().unwrap(), ["H"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream() {
        let trace = Trace::default();
        let stop = from_fn("stop", |_req, _next| async {
            Ok(Response::failure(StatusCode::IM_A_TEAPOT, "TEAPOT", "short and stout"))
        });
        let chain = Chain::new()
            .with(tracer("A", &trace))
            .with(stop)
            .with(tracer("C", &trace));

        let res = chain.execute(Request::default(), recording_handler(&trace)).await;

        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.error.unwrap().message, "short and stout");
        assert_eq!(*trace.lock().unwrap(), ["A-in", "A-out"]);
    }

    #[tokio::test]
    async fn second_continuation_call_is_rejected() {
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(Mutex::new(None));

        let twice = {
            let second = Arc::clone(&second);
            from_fn("twice", move |req: Request, next: Next| {
                let second = Arc::clone(&second);
                async move {
                    let first = next.clone().run(req).await;
                    let again = next.run(Request::default()).await;
                    *second.lock().unwrap() = Some(again.status_code());
                    Ok(first)
                }
            })
        };
        let calls = Arc::clone(&handler_calls);
        let chain = Chain::new().with(twice);
        let res = chain
            .execute(Request::default(), move |_req: Request| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(StatusCode::OK)
                }
            })
            .await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(*second.lock().unwrap(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reentrancy_renders_internal_error() {
        let chain = Chain::new().with(from_fn("twice", |req: Request, next: Next| async move {
            let _ = next.clone().run(req).await;
            Ok(next.run(Request::default()).await)
        }));
        let res = chain
            .execute(Request::default(), |_req: Request| async { Ok::<_, Error>(StatusCode::OK) })
            .await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.error.unwrap().code, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn stale_continuation_from_an_outer_layer_is_rejected() {
        let stash: Arc<Mutex<Option<Next>>> = Arc::default();
        let inner_status = Arc::new(Mutex::new(None));
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = Arc::new(AtomicUsize::new(0));

        let outer = {
            let stash = Arc::clone(&stash);
            from_fn("outer", move |req, next: Next| {
                let stash = Arc::clone(&stash);
                async move {
                    *stash.lock().unwrap() = Some(next.clone());
                    Ok(next.run(req).await)
                }
            })
        };
        let inner = {
            let stash = Arc::clone(&stash);
            let inner_status = Arc::clone(&inner_status);
            let inner_calls = Arc::clone(&inner_calls);
            from_fn("inner", move |req, next: Next| {
                let stale = stash.lock().unwrap().take();
                let inner_status = Arc::clone(&inner_status);
                let inner_calls = Arc::clone(&inner_calls);
                async move {
                    inner_calls.fetch_add(1, Ordering::SeqCst);
                    if let Some(stale) = stale {
                        let res = stale.run(Request::default()).await;
                        let code = res.json::<Envelope>().ok().and_then(|e| e.error).map(|e| e.code);
                        *inner_status.lock().unwrap() = Some((res.status_code(), code));
                    }
                    Ok(next.run(req).await)
                }
            })
        };

        let calls = Arc::clone(&handler_calls);
        let res = Chain::new()
            .with(outer)
            .with(inner)
            .execute(Request::default(), move |_req: Request| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(StatusCode::OK)
                }
            })
            .await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *inner_status.lock().unwrap(),
            Some((StatusCode::INTERNAL_SERVER_ERROR, Some("INTERNAL_ERROR".to_owned())))
        );
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_whose_display_panics_still_yields_500() {
        #[derive(Debug)]
        struct Garbled;
        impl fmt::Display for Garbled {
            fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
                panic!("display exploded");
            }
        }
        impl std::error::Error for Garbled {}

        let outcome = tokio::spawn(async {
            Chain::new()
                .execute(Request::default(), |_req: Request| async {
                    Err::<StatusCode, _>(Error::other(Garbled))
                })
                .await
        })
        .await;

        let res = outcome.expect("execute must not panic");
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.error.unwrap().code, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn handler_errors_are_rendered_once_at_their_layer() {
        let seen = Arc::new(Mutex::new(None));
        let observer = {
            let seen = Arc::clone(&seen);
            from_fn("observer", move |req, next: Next| {
                let seen = Arc::clone(&seen);
                async move {
                    let res = next.run(req).await;
                    *seen.lock().unwrap() = Some(res.status_code());
                    Ok(res)
                }
            })
        };
        let res = Chain::new()
            .with(observer)
            .execute(Request::default(), |_req: Request| async {
                Err::<StatusCode, _>(Error::not_found("Quiz"))
            })
            .await;

        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(*seen.lock().unwrap(), Some(StatusCode::NOT_FOUND));
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.error.unwrap().message, "Quiz not found");
    }

    #[tokio::test]
    async fn middleware_errors_are_rendered() {
        let chain = Chain::new().with(from_fn("deny", |_req, _next| async {
            Err(Error::forbidden("Requires role admin"))
        }));
        let res = chain
            .execute(Request::default(), |_req: Request| async { Ok::<_, Error>(StatusCode::OK) })
            .await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn panics_become_generic_500() {
        let res = Chain::new()
            .execute(Request::default(), |_req: Request| async {
                if true {
                    panic!("attempt table missing");
                }
                Ok::<_, Error>(StatusCode::OK)
            })
            .await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!String::from_utf8_lossy(res.body()).contains("attempt table"));
    }

    #[tokio::test]
    async fn downstream_sees_transformed_request() {
        #[derive(Clone)]
        struct Tag(&'static str);

        let chain = Chain::new().with(from_fn("tag", |req: Request, next: Next| async move {
            Ok(next.run(req.with_extension(Tag("tagged"))).await)
        }));
        let res = chain
            .execute(Request::default(), |req: Request| async move {
                let tag = req.extension::<Tag>().map(|t| t.0).unwrap_or("missing");
                Ok::<_, Error>(Json(tag))
            })
            .await;
        let body: Envelope = res.json().unwrap();
        assert_eq!(body.data.unwrap(), "tagged");
    }

    #[tokio::test]
    async fn each_execute_starts_a_fresh_cursor() {
        let chain = Chain::new().with(from_fn("pass", |req, next: Next| async move {
            Ok(next.run(req).await)
        }));
        for _ in 0..3 {
            let res = chain
                .execute(Request::default(), |_req: Request| async { Ok::<_, Error>(StatusCode::OK) })
                .await;
            assert_eq!(res.status_code(), StatusCode::OK);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cycles_do_not_interfere() {
        let chain = Arc::new(Chain::new().with(from_fn("yield", |req, next: Next| async move {
            tokio::task::yield_now().await;
            Ok(next.run(req).await)
        })));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64 {
            let chain = Arc::clone(&chain);
            tasks.spawn(async move {
                chain
                    .execute(Request::default(), move |_req: Request| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, Error>(Json(i))
                    })
                    .await
            });
        }
        while let Some(res) = tasks.join_next().await {
            assert_eq!(res.unwrap().status_code(), StatusCode::OK);
        }
    }

    #[test]
    fn names_follow_declaration_order() {
        let mut chain = Chain::new().with(from_fn("log", |req, next: Next| async move {
            Ok(next.run(req).await)
        }));
        chain.push(from_fn("auth", |req, next: Next| async move { Ok(next.run(req).await) }));
        assert_eq!(chain.names(), ["log", "auth"]);
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
    }
}
