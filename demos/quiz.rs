//! strata demo: a tiny quiz API driven without a network.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example quiz
//!
//! Each request goes through [request-log, bearer-auth, validate-request]
//! and the printed body is exactly what a host server would send.

use serde::{Deserialize, Serialize};
use serde_json::json;
use strata::health::{self, HealthRegistry};
use strata::middleware::{BearerAuth, Identity, RequestLog, StaticTokens, ValidateRequest, Validated};
use strata::validate::Schema;
use strata::{Chain, Config, Error, Json, Request, Response};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NewQuiz {
    title: String,
    questions: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "falling back to default config");
        Config::default()
    });

    let tokens = StaticTokens::new()
        .with("instructor-token", Identity::new("ms-frizzle").with_role("instructor"));

    let api = Chain::from_config(&config)
        .with(RequestLog::from_config(&config))
        .with(BearerAuth::new(tokens));

    let create = api.clone().with(
        ValidateRequest::new().body(
            Schema::object()
                .field("title", Schema::string().non_blank().max_len(80))
                .field("questions", Schema::array(Schema::string().min_len(3)).min_items(1)),
        ),
    );

    let health = HealthRegistry::from_config(&config);
    health.register("question-bank", || async { Ok(()) });
    let probes = Chain::from_config(&config).with(RequestLog::from_config(&config));

    show("GET /quizzes/q-1", api.execute(authed(), get_quiz).await);
    show("GET /quizzes/q-1 (no token)", api.execute(Request::default(), get_quiz).await);
    show(
        "POST /quizzes",
        create
            .execute(
                authed().with_json(&json!({ "title": "Borrowing", "questions": ["What is &mut?"] })),
                create_quiz,
            )
            .await,
    );
    show(
        "POST /quizzes (invalid)",
        create
            .execute(authed().with_json(&json!({ "title": " ", "questions": [] })), create_quiz)
            .await,
    );
    show("GET /quizzes/missing", api.execute(authed(), missing_quiz).await);
    show("GET /healthz", probes.execute(Request::default(), health::liveness).await);
    show("GET /readyz", probes.execute(Request::default(), health.readiness()).await);
}

fn authed() -> Request {
    Request::default().with_header("authorization", "Bearer instructor-token")
}

fn show(label: &str, res: Response) {
    println!("{label:<28} {} {}", res.status_code(), String::from_utf8_lossy(res.body()));
}

async fn get_quiz(req: Request) -> Result<Json<serde_json::Value>, Error> {
    let owner = req.extension::<Identity>().map(|i| i.subject.clone());
    Ok(Json(json!({ "id": "q-1", "title": "Ownership", "owner": owner })))
}

async fn create_quiz(req: Request) -> Result<(http::StatusCode, Json<NewQuiz>), Error> {
    let validated = req
        .extension::<Validated>()
        .ok_or_else(|| Error::internal("body was not validated"))?;
    let quiz: NewQuiz = validated.body_as()?;
    Ok((http::StatusCode::CREATED, Json(quiz)))
}

async fn missing_quiz(_req: Request) -> Result<Json<()>, Error> {
    Err(Error::not_found("Quiz"))
}
