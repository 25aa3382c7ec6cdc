//! Liveness and readiness probes.
//!
//! | Probe | Question | Answer |
//! |---|---|---|
//! | [`liveness`] | Is the process alive? | always 200 |
//! | [`HealthRegistry::readiness`] | Can it serve traffic? | 200 when every check is up, else 503 |
//!
//! Checks live in a [`HealthRegistry`] the application builds and hands to
//! whatever needs it. There is no process-wide registry.
//!
//! ```rust
//! use strata::{Chain, Request};
//! use strata::health::HealthRegistry;
//!
//! # async fn run() {
//! let health = HealthRegistry::new();
//! health.register("database", || async { Ok(()) });
//!
//! let res = Chain::new().execute(Request::default(), health.readiness()).await;
//! assert_eq!(res.status_code(), 200);
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::join_all;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::config::Config;
use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::response::{Envelope, Json, Response};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

type CheckFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Liveness probe. Answers 200 as long as the process can answer at all.
pub async fn liveness(_req: Request) -> Result<Json<Value>, Error> {
    Ok(Json(json!({ "status": "ok" })))
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckOutcome {
    Up { elapsed_ms: u64 },
    Down { reason: String },
}

impl CheckOutcome {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub ready: bool,
    pub checks: BTreeMap<String, CheckOutcome>,
}

/// Named readiness checks, shared by cloning.
#[derive(Clone)]
pub struct HealthRegistry {
    checks: Arc<DashMap<String, CheckFn>>,
    timeout: Duration,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self { checks: Arc::new(DashMap::new()), timeout: DEFAULT_TIMEOUT }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_timeout(config.health_timeout())
    }

    /// Time each check gets before it counts as down.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds or replaces the check called `name`.
    ///
    /// A check reports `Err(reason)` when its dependency is unavailable.
    pub fn register<F, Fut>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let boxed: CheckFn =
            Arc::new(move || -> BoxFuture<'static, Result<(), String>> { Box::pin(check()) });
        self.checks.insert(name.into(), boxed);
    }

    /// Removes a check; `false` if there was none.
    pub fn deregister(&self, name: &str) -> bool {
        self.checks.remove(name).is_some()
    }

    /// Registered check names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Runs every check concurrently.
    pub async fn report(&self) -> HealthReport {
        // Clone out of the map so no shard lock is held across an await.
        let snapshot: Vec<(String, CheckFn)> = self
            .checks
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let timeout = self.timeout;
        let outcomes = join_all(snapshot.into_iter().map(|(name, check)| async move {
            let outcome = run_check(&check, timeout).await;
            if let CheckOutcome::Down { reason } = &outcome {
                warn!(check = %name, %reason, "health check failed");
            }
            (name, outcome)
        }))
        .await;

        let checks: BTreeMap<_, _> = outcomes.into_iter().collect();
        HealthReport { ready: checks.values().all(CheckOutcome::is_up), checks }
    }

    /// Readiness probe handler bound to this registry.
    pub fn readiness(&self) -> impl Handler {
        let registry = self.clone();
        move |_req: Request| {
            let registry = registry.clone();
            async move {
                let report = registry.report().await;
                if report.ready {
                    return Ok(Response::ok(report));
                }
                let envelope = Envelope::failure("SERVICE_UNAVAILABLE", "Service not ready")
                    .with_details(serde_json::to_value(&report)?);
                Ok::<_, Error>(Response::envelope(StatusCode::SERVICE_UNAVAILABLE, &envelope))
            }
        }
    }
}

async fn run_check(check: &CheckFn, timeout: Duration) -> CheckOutcome {
    let started = Instant::now();
    let guarded = AssertUnwindSafe((**check)()).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(Ok(()))) => CheckOutcome::Up { elapsed_ms: started.elapsed().as_millis() as u64 },
        Ok(Ok(Err(reason))) => CheckOutcome::Down { reason },
        Ok(Err(_)) => CheckOutcome::Down { reason: "check panicked".to_owned() },
        Err(_) => CheckOutcome::Down { reason: format!("timed out after {}ms", timeout.as_millis()) },
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("checks", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}
