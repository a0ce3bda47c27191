//! REST API and WebSocket server for the ingestion hub
//!
//! Agents register and stream their reports here; operators query the live
//! state and alert history.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Actor handles** for the dispatcher, live state and alert sink
//! - **WebSocket** for report ingestion and real-time alert streaming
//!
//! ## Endpoints
//!
//! Open to agents:
//! - `POST /api/v1/register` - Register an agent, returns its report interval
//! - `WS /api/v1/ingest` - Stream reports for one service
//! - `GET /api/v1/health` - Health check
//!
//! Behind the bearer token (when configured):
//! - `GET /api/v1/status` - Last known report per service
//! - `GET /api/v1/alerts/history` - Most recent alerts
//! - `WS /api/v1/alerts/stream` - Real-time alert streaming
//! - `GET /api/v1/stats` - Pipeline statistics

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod ingest;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{DispatcherStats, HealthResponse, HistoryQuery, StatsResponse, WorkerPoolStats};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
#[cfg(feature = "api")]
use tracing::info;

#[cfg(feature = "api")]
use crate::config::ApiSettings;

/// Build the router with every route and layer
#[cfg(feature = "api")]
pub fn router(settings: &ApiSettings, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut queries = Router::new()
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/alerts/history", get(routes::alerts::get_history))
        .route("/api/v1/alerts/stream", get(websocket::websocket_handler))
        .route("/api/v1/stats", get(routes::stats::get_stats));

    if let Some(token) = settings.token.clone() {
        queries = queries.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = Router::new()
        .route("/api/v1/register", post(routes::register::register))
        .route("/api/v1/ingest", get(ingest::ingest_handler))
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(queries)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if settings.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// The server stops accepting connections once the hub starts draining and
/// finishes when the last open connection is gone. Returns the bound address
/// and the server task.
#[cfg(feature = "api")]
pub async fn spawn_api_server(
    settings: &ApiSettings,
    state: ApiState,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    info!("starting API server on {}", settings.bind);

    let mut lifecycle = state.lifecycle.clone();
    let app = router(settings, state);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = lifecycle.wait_for(|state| state.is_shutting_down()).await;
            info!("API server no longer accepting connections");
        };

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok((addr, handle))
}
