//! Alert history endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use tracing::debug;

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::HistoryQuery,
    },
    storage::AlertRecord,
};

/// GET /api/v1/alerts/history?limit=N
///
/// Most recent alerts, newest first. Alerts still buffered in the sink are
/// included.
pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<AlertRecord>>> {
    let limit = query
        .effective_limit()
        .ok_or_else(|| ApiError::InvalidRequest("limit must be at least 1".to_string()))?;

    let alerts = state.sink.recent(limit).await?;
    debug!("returning {} alerts (limit {limit})", alerts.len());

    Ok(Json(alerts))
}
