//! Pipeline statistics endpoint

use axum::{Json, extract::State};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{DispatcherStats, StatsResponse, WorkerPoolStats},
};

/// GET /api/v1/stats
///
/// Returns queue depth, worker counters, live service count and sink stats
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let now = chrono::Utc::now();
    let dispatcher = &state.dispatcher;

    Ok(Json(StatsResponse {
        timestamp: now.to_rfc3339(),
        lifecycle: state.lifecycle_state(),
        uptime_secs: (now - state.started_at).num_seconds(),
        dispatcher: DispatcherStats {
            depth: dispatcher.depth(),
            capacity: dispatcher.capacity(),
            closed: dispatcher.is_closed(),
        },
        workers: WorkerPoolStats {
            size: dispatcher.workers(),
            processed: state.worker_stats.processed(),
            alerts_raised: state.worker_stats.alerts_raised(),
        },
        live_services: state.live_state.len().await,
        sink: state.sink.stats().await,
    }))
}
