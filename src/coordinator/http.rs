//! HTTP surface: owner-facing expression endpoints and agent-facing task
//! endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::auth::{self, IdentityProvider};
use super::Coordinator;
use crate::error::{AuthError, DatabaseError, Error};
use crate::tasks::{TaskEnvelope, TaskReport};

/// Shared state for the coordinator's routes.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub identities: Arc<dyn IdentityProvider>,
    pub agent_secret: SecretString,
}

/// Build the coordinator router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/expressions", get(list_expressions).post(submit_expression))
        .route("/expressions/{id}", get(get_expression))
        .route("/internal/task", get(fetch_task).post(report_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, e.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(e) => Self::new(StatusCode::BAD_REQUEST, format!("Invalid expression: {e}")),
            Error::Auth(e) => e.into(),
            Error::Task(e) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            Error::Database(DatabaseError::NotFound { entity, .. }) => {
                Self::new(StatusCode::NOT_FOUND, format!("{entity} not found"))
            }
            other => {
                error!(error = %other, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    expression: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: String,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let board = state.coordinator.board_stats().await;
    let evaluation = state.coordinator.evaluation_stats();
    Json(serde_json::json!({
        "status": "ok",
        "service": "calc-grid",
        "version": env!("CARGO_PKG_VERSION"),
        "tasks": board,
        "evaluation": evaluation,
    }))
}

async fn submit_expression(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = auth::authenticate_owner(state.identities.as_ref(), &headers).await?;
    let Json(body) = body.map_err(|e| {
        warn!(error = %e, "Malformed submit body");
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid request body")
    })?;

    let expr = state.coordinator.submit(&owner, &body.expression).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { id: expr.id })))
}

async fn list_expressions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner = auth::authenticate_owner(state.identities.as_ref(), &headers).await?;
    let expressions = state.coordinator.list_expressions(&owner).await?;
    Ok(Json(expressions))
}

async fn get_expression(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = auth::authenticate_owner(state.identities.as_ref(), &headers).await?;
    let expr = state.coordinator.get_expression(&owner, &id).await?;
    Ok(Json(expr))
}

async fn fetch_task(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    auth::authenticate_agent(&state.agent_secret, &headers)?;
    match state.coordinator.fetch_task().await {
        Some(task) => Ok(Json(TaskEnvelope { task })),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "No tasks available")),
    }
}

async fn report_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TaskReport>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    auth::authenticate_agent(&state.agent_secret, &headers)?;
    let Json(report) = body.map_err(|e| {
        warn!(error = %e, "Malformed task report");
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "Invalid request body")
    })?;

    state.coordinator.report_result(report).await?;
    Ok(StatusCode::OK)
}
