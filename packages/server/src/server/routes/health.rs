use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;
use crate::task::TaskPhase;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    task_phase: TaskPhase,
}

/// Health check endpoint
///
/// Always 200 while the process serves requests; reports the orchestrator
/// phase alongside.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            task_phase: state.orchestrator.phase(),
        }),
    )
}
