use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use super::{BoxFuture, Middleware, Next};
use crate::config::Config;
use crate::error::Error;
use crate::log::{Level, Logger, TracingLogger, emit};
use crate::request::Request;
use crate::response::Response;

const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(1000);

/// Logs every request on its way in and its way out.
///
/// The outbound event carries `method`, `path`, `status` and `elapsed_ms`.
/// It is `info` normally, `warn` when the request was slower than the
/// threshold or answered with a 5xx. Put it first in the chain to observe
/// short-circuits and rendered failures from every inner layer.
#[derive(Clone)]
pub struct RequestLog {
    logger: Arc<dyn Logger>,
    slow_threshold: Duration,
}

impl RequestLog {
    pub fn new() -> Self {
        Self { logger: Arc::new(TracingLogger), slow_threshold: DEFAULT_SLOW_THRESHOLD }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().slow_threshold(config.slow_request_threshold())
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RequestLog {
    fn name(&self) -> &str {
        "request-log"
    }

    fn call<'a>(&'a self, request: Request, next: Next) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.path().to_owned();
            emit(
                &*self.logger,
                Level::DEBUG,
                "request started",
                Some(&json!({ "method": method, "path": path })),
            );

            let started = Instant::now();
            let response = next.run(request).await;
            let elapsed = started.elapsed();

            let status = response.status_code();
            let level = if status.is_server_error() || elapsed > self.slow_threshold {
                Level::WARN
            } else {
                Level::INFO
            };
            emit(
                &*self.logger,
                level,
                "request completed",
                Some(&json!({
                    "method": method,
                    "path": path,
                    "status": status.as_u16(),
                    "elapsed_ms": elapsed.as_millis() as u64,
                })),
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode, Uri};

    use super::*;
    use crate::Chain;
    use crate::log::testing::RecordingLogger;

    fn request() -> Request {
        Request::new(Method::GET, Uri::from_static("/quizzes/q-1"))
    }

    #[tokio::test]
    async fn logs_both_phases_with_status() {
        let logger = Arc::new(RecordingLogger::default());
        let chain = Chain::new().with(RequestLog::new().with_logger(logger.clone()));

        chain
            .execute(request(), |_req: Request| async { Ok::<_, Error>(StatusCode::CREATED) })
            .await;

        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, Level::DEBUG);
        assert_eq!(events[1].0, Level::INFO);
        let context = events[1].2.as_ref().unwrap();
        assert_eq!(context["method"], "GET");
        assert_eq!(context["path"], "/quizzes/q-1");
        assert_eq!(context["status"], 201);
        assert!(context["elapsed_ms"].is_u64());
    }

    #[tokio::test]
    async fn server_errors_log_at_warn() {
        let logger = Arc::new(RecordingLogger::default());
        let chain = Chain::new()
            .with(RequestLog::new().with_logger(logger.clone()))
            .with_boundary(crate::Boundary::new().with_shared_logger(Arc::new(RecordingLogger::default())));

        let res = chain
            .execute(request(), |_req: Request| async {
                Err::<StatusCode, _>(Error::internal("db down"))
            })
            .await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let last = logger.events().pop().unwrap();
        assert_eq!(last.0, Level::WARN);
        assert_eq!(last.2.unwrap()["status"], 500);
    }

    #[tokio::test]
    async fn panicking_logger_keeps_the_downstream_response() {
        struct LoudOnly;
        impl Logger for LoudOnly {
            fn log(&self, level: Level, _: &str, _: Option<&serde_json::Value>) {
                if level != Level::DEBUG {
                    panic!("log sink unavailable");
                }
            }
        }

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let chain = Chain::new().with(RequestLog::new().with_logger(Arc::new(LoudOnly)));
        let res = chain
            .execute(request(), move |_req: Request| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, Error>(StatusCode::CREATED)
                }
            })
            .await;

        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_requests_log_at_warn() {
        let logger = Arc::new(RecordingLogger::default());
        let chain = Chain::new().with(
            RequestLog::new()
                .with_logger(logger.clone())
                .slow_threshold(Duration::from_millis(5)),
        );

        chain
            .execute(request(), |_req: Request| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, Error>(StatusCode::OK)
            })
            .await;

        assert_eq!(logger.events().pop().unwrap().0, Level::WARN);
    }
}
