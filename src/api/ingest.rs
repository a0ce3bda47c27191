//! WebSocket transport for ingestion sessions
//!
//! GET /api/v1/ingest with a `service-id` header. Each text frame is one
//! [`IngestFrame`]. An `end` frame finishes the session cleanly and is
//! answered with the [`SessionSummary`](crate::SessionSummary) followed by a
//! normal close. Failed sessions are closed with code 1011. Sessions the hub
//! cuts at the end of its drain period are closed with code 1001.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{
    SinkExt, Stream,
    stream::{self, SplitStream, StreamExt},
};
use tracing::{debug, warn};

use crate::{
    IngestFrame, MetricReport,
    api::{
        error::{ApiError, ApiResult},
        routes::register::service_id_from,
        state::ApiState,
    },
    ingest::{IngestSession, SessionGuard},
};

/// Close reasons are limited to 123 bytes on the wire
const MAX_CLOSE_REASON: usize = 123;

/// WebSocket upgrade handler
///
/// GET /api/v1/ingest
pub async fn ingest_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> ApiResult<Response> {
    let service_id = service_id_from(&headers)?;

    // Counted before the state check, so a hub that starts draining now waits for it
    let guard = state.sessions.enter();
    if !state.accepts_sessions() {
        return Err(ApiError::ServiceUnavailable(format!(
            "hub is {}",
            state.lifecycle_state()
        )));
    }

    Ok(ws.on_upgrade(move |socket| handle_session(socket, service_id, state, guard)))
}

async fn handle_session(
    socket: WebSocket,
    service_id: String,
    state: ApiState,
    _guard: SessionGuard,
) {
    let (mut sender, receiver) = socket.split();

    let session = IngestSession::new(service_id, state.dispatcher.clone(), state.live_state);

    let outcome = tokio::select! {
        result = session.run(report_frames(receiver)) => result,
        _ = state.sessions.stopped() => {
            debug!("drain period over, cutting session");
            let close = CloseFrame {
                code: close_code::AWAY,
                reason: "hub shutting down".into(),
            };
            let _ = sender.send(Message::Close(Some(close))).await;
            return;
        }
    };

    let close = match outcome {
        Ok(summary) => {
            match serde_json::to_string(&summary) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("agent left before receiving its summary");
                    }
                }
                Err(e) => warn!("failed to encode session summary: {e}"),
            }
            CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            }
        }
        Err(e) => CloseFrame {
            code: close_code::ERROR,
            reason: truncate_reason(e.to_string()).into(),
        },
    };

    let _ = sender.send(Message::Close(Some(close))).await;
}

/// Decode websocket frames into the report stream a session consumes
///
/// The stream ends after an `end` or close frame. A dropped socket, a binary
/// frame or an undecodable text frame yields one error and ends the stream.
fn report_frames(
    receiver: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<MetricReport, String>> {
    stream::unfold(Some(receiver), |receiver| async move {
        let mut receiver = receiver?;

        loop {
            let message = match receiver.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Some((Err(e.to_string()), None)),
                None => return Some((Err("connection dropped".to_string()), None)),
            };

            match message {
                Message::Text(text) => {
                    return match serde_json::from_str::<IngestFrame>(&text) {
                        Ok(IngestFrame::Report(report)) => Some((Ok(report), Some(receiver))),
                        Ok(IngestFrame::End) => None,
                        Err(e) => Some((Err(format!("malformed frame: {e}")), None)),
                    };
                }
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Binary(_) => {
                    return Some((Err("binary frames are not supported".to_string()), None));
                }
            }
        }
    })
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
