use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, error};
use crate::error::{ErrorKind, RagError};
use crate::pipeline::RagPipeline;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/answer", post(answer_question))
        .route("/context", post(preview_context))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(Arc::new(state))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn answer_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<AnswerResponse> {
    let start_time = std::time::Instant::now();

    let answer = state.pipeline.answer(&request.question).await.map_err(|e| {
        error!("Answer failed: {}", e);
        create_error_response(&e)
    })?;

    let processing_time = start_time.elapsed().as_millis() as u64;
    info!("Answer produced in {}ms", processing_time);

    Ok(Json(AnswerResponse {
        answer: answer.text,
        processing_time_ms: processing_time,
    }))
}

async fn preview_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<ContextResponse> {
    let context = state.pipeline.preview_context(&request.question).await.map_err(|e| {
        error!("Context preview failed: {}", e);
        create_error_response(&e)
    })?;

    Ok(Json(ContextResponse { context }))
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Embedding | ErrorKind::Generation => StatusCode::BAD_GATEWAY,
        ErrorKind::Index => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn create_error_response(err: &RagError) -> (StatusCode, Json<ErrorResponse>) {
    let kind = err.kind();
    (
        status_for(kind),
        Json(ErrorResponse {
            error: err.user_message(),
            code: kind,
            timestamp: chrono::Utc::now(),
        }),
    )
}

// Middleware for request logging
pub async fn logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = %latency.as_millis(),
        "Request processed"
    );

    response
}
