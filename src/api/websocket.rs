//! WebSocket handler for real-time alert streaming

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{debug, info, warn};

use crate::{api::state::ApiState, hub::LifecycleState};

/// WebSocket upgrade handler
///
/// GET /api/v1/alerts/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("alert stream client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut alert_rx = state.sink.subscribe();
    let mut lifecycle = state.lifecycle.clone();

    // Forward alert events until the client leaves or the hub drains
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = alert_rx.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("alert stream client lagging, skipped {skipped} alerts");
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            debug!("alert broadcast closed");
                            break;
                        }
                    };

                    let json = serde_json::json!({
                        "type": "alert",
                        "service_id": event.service_id,
                        "metric": event.metric,
                        "observed_value": event.observed_value,
                        "threshold": event.threshold,
                        "timestamp": event.timestamp.to_rfc3339(),
                    });

                    if sender.send(Message::Text(json.to_string())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }

                _ = draining(&mut lifecycle) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Incoming frames are ignored apart from close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("alert stream client disconnected");
}

/// Resolve once the hub starts shutting down
///
/// The borrowed state is released before returning, so nothing holds the
/// watch lock while the caller keeps awaiting.
async fn draining(lifecycle: &mut watch::Receiver<LifecycleState>) {
    let _ = lifecycle.wait_for(|state| state.is_shutting_down()).await;
}
