//! Bearer token guard for the query routes

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};

/// Let the request through only with `Authorization: Bearer <token>`
///
/// Rejections use the same JSON error body as every other route.
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)?;

    if token != expected_token {
        debug!("rejected request to {} with wrong token", request.uri().path());
        return Err(ApiError::Forbidden("invalid token".to_string()));
    }

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request<Body>) -> ApiResult<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::Unauthorized("expected Authorization: Bearer <token>".to_string())
        })
}
