//! HTTP workflow trigger.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/workflows/insurance-faq/run` | Run the workflow for `{"question": "..."}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! A well-formed trigger always gets `200` with a workflow result, including
//! when the workflow itself fails:
//!
//! ```json
//! { "status": "error", "error": "document not found at path: ..." }
//! ```
//!
//! Malformed payloads are rejected before the workflow runs:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::models::{Trigger, WorkflowResult};
use crate::workflow::FaqService;

pub const RUN_PATH: &str = "/workflows/insurance-faq/run";

/// Build the router around a shared service.
pub fn router(service: Arc<FaqService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(RUN_PATH, post(handle_run))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(service: Arc<FaqService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        "insurance FAQ server listening on http://{}",
        listener.local_addr()?
    );
    axum::serve(listener, router(service)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /workflows/insurance-faq/run ============

async fn handle_run(
    State(service): State<Arc<FaqService>>,
    payload: Result<Json<Trigger>, JsonRejection>,
) -> Result<Json<WorkflowResult>, AppError> {
    let Json(trigger) = payload.map_err(|e| bad_request(e.body_text()))?;

    if trigger.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    Ok(Json(service.ask(&trigger.question).await))
}
