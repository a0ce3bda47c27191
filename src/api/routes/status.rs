//! Live status endpoint

use std::collections::BTreeMap;

use axum::{Json, extract::State};

use crate::{MetricReport, ServiceId, api::state::ApiState};

/// GET /api/v1/status
///
/// Last fully processed report of every connected service, keyed by service id
pub async fn get_status(State(state): State<ApiState>) -> Json<BTreeMap<ServiceId, MetricReport>> {
    let snapshot = state.live_state.snapshot().await;
    Json(snapshot.into_iter().collect())
}
