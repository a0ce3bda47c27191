//! Agent registration endpoint

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use tracing::info;

use crate::{
    AgentConfig, AgentInfo,
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
    },
    ingest::IngestError,
    util::{SERVICE_ID_HEADER, parse_service_id},
};

/// POST /api/v1/register
///
/// Takes the `service-id` header and `{os_version, agent_version}`, returns
/// the reporting interval the agent should use.
pub async fn register(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<AgentInfo>, JsonRejection>,
) -> ApiResult<Json<AgentConfig>> {
    let service_id = service_id_from(&headers)?;
    let Json(info) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    if !state.accepts_sessions() {
        return Err(ApiError::ServiceUnavailable(format!(
            "hub is {}",
            state.lifecycle_state()
        )));
    }

    info!(
        "agent registered: {service_id} (os {}, agent {})",
        info.os_version, info.agent_version
    );

    Ok(Json(AgentConfig {
        report_interval_ms: state.report_interval_ms,
        active: true,
    }))
}

/// Validated service identity from request headers
pub(crate) fn service_id_from(headers: &HeaderMap) -> ApiResult<String> {
    let raw = headers
        .get(SERVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    parse_service_id(raw).ok_or_else(|| {
        IngestError::Registration(format!("missing or blank {SERVICE_ID_HEADER} header")).into()
    })
}
