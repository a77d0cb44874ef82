//! The stateless compute function and the `/compute` endpoint an agent
//! hosts for it.

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::EvalError;
use crate::tasks::Operation;

/// Body of `POST /compute`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub arg1: f64,
    pub arg2: f64,
    pub operation: Operation,
}

/// Compute `arg1 <operation> arg2`. Non-finite results are rejected.
pub fn compute(arg1: f64, arg2: f64, operation: Operation) -> Result<f64, EvalError> {
    let value = operation.apply(arg1, arg2)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

/// Router exposing `POST /compute`.
pub fn compute_routes() -> Router {
    Router::new()
        .route("/compute", post(compute_handler))
        .layer(TraceLayer::new_for_http())
}

async fn compute_handler(Json(req): Json<ComputeRequest>) -> impl IntoResponse {
    match compute(req.arg1, req.arg2, req.operation) {
        Ok(value) => {
            debug!(arg1 = req.arg1, arg2 = req.arg2, operation = %req.operation, value, "Computed");
            (StatusCode::OK, Json(serde_json::json!(value)))
        }
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
