//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Returns a simple health check response
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let lifecycle = state.lifecycle_state();
    let status = if lifecycle.accepts_sessions() {
        "ok".to_string()
    } else {
        lifecycle.to_string()
    };

    Json(HealthResponse {
        status,
        lifecycle: lifecycle.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
