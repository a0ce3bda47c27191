//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Registration validates the agent identity
//! - Ingest sessions over the websocket end with a summary or an error close
//! - Status and history reflect what was streamed
//! - Authentication only guards the query routes
//! - Sessions are refused while the hub is not running

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::frame::coding::CloseCode,
    },
};
use tower::ServiceExt;
use watchtower::{
    AgentConfig, IngestFrame, MetricReport, SessionSummary,
    actors::{dispatcher::Dispatcher, sink::AlertSinkHandle, worker::WorkerStats},
    api::{ApiState, router, spawn_api_server},
    config::{ApiSettings, SinkConfig},
    hub::{Hub, LifecycleState},
    ingest::SessionTracker,
    state::LiveState,
    storage::{AlertRecord, memory::MemoryAlertStore},
};

use crate::helpers::{eventually, hub_config, report};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_hub(token: Option<&str>) -> (Hub, SocketAddr) {
    let hub = Hub::start(hub_config(token)).await.unwrap();
    let addr = hub.local_addr().unwrap();
    (hub, addr)
}

async fn open_ingest(addr: SocketAddr, service_id: &str) -> Result<Ws, tungstenite::Error> {
    let mut request = format!("ws://{addr}/api/v1/ingest")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("service-id", HeaderValue::from_str(service_id).unwrap());
    connect_async(request).await.map(|(ws, _)| ws)
}

async fn send_report(ws: &mut Ws, report: MetricReport) {
    let frame = serde_json::to_string(&IngestFrame::Report(report)).unwrap();
    ws.send(Message::Text(frame)).await.unwrap();
}

/// Read frames until the hub closes the socket, returning the text frames and close code
async fn read_until_close(ws: &mut Ws) -> (Vec<String>, Option<CloseCode>) {
    let mut texts = vec![];
    let read = async {
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => texts.push(text),
                Ok(Message::Close(frame)) => return frame.map(|f| f.code),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    };
    let code = tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("hub did not close the session");
    (texts, code)
}

async fn get_status(addr: SocketAddr, token: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("http://{addr}/api/v1/status"));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_register_returns_agent_config() {
    let (hub, addr) = start_hub(None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/v1/register"))
        .header("service-id", "service-agent-001")
        .json(&json!({"os_version": "Linux 6.1", "agent_version": "v1.2.0"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let config: AgentConfig = response.json().await.unwrap();
    assert_eq!(
        config,
        AgentConfig {
            report_interval_ms: 500,
            active: true,
        }
    );

    hub.shutdown().await;
}

#[tokio::test]
async fn test_register_rejects_bad_requests() {
    let (hub, addr) = start_hub(None).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/register");
    let body = json!({"os_version": "Linux", "agent_version": "v1"});

    // Missing identity
    let response = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: Value = response.json().await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("service-id"));

    // Blank identity
    let response = client
        .post(&url)
        .header("service-id", "   ")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed metadata
    let response = client
        .post(&url)
        .header("service-id", "svc")
        .header("content-type", "application/json")
        .body("{\"os_version\": 3}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_clean_session_returns_summary_and_clears_status() {
    let (hub, addr) = start_hub(None).await;
    let mut ws = open_ingest(addr, "svc-1").await.unwrap();

    for i in 0..5 {
        send_report(&mut ws, report(20.0, 512.0, i)).await;
    }
    let end = serde_json::to_string(&IngestFrame::End).unwrap();
    ws.send(Message::Text(end)).await.unwrap();

    let (texts, code) = read_until_close(&mut ws).await;
    assert_eq!(code, Some(CloseCode::Normal));
    assert_eq!(texts.len(), 1);
    let summary: SessionSummary = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(summary, SessionSummary::success(5));

    let status: Value = get_status(addr, None).await.json().await.unwrap();
    assert!(status.get("svc-1").is_none());

    hub.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_closes_with_error_and_keeps_status() {
    let (hub, addr) = start_hub(None).await;
    let mut ws = open_ingest(addr, "svc-2").await.unwrap();

    send_report(&mut ws, report(30.0, 100.0, 1)).await;
    send_report(&mut ws, report(31.0, 100.0, 2)).await;
    ws.send(Message::Text("{\"type\":\"report\",\"cpu\":\"oops\"}".to_string()))
        .await
        .unwrap();

    let (texts, code) = read_until_close(&mut ws).await;
    assert!(texts.is_empty());
    assert_eq!(code, Some(CloseCode::Error));

    let retained = eventually(|| async {
        let status: Value = get_status(addr, None).await.json().await.unwrap();
        status["svc-2"]["request_count"] == json!(2)
    })
    .await;
    assert!(retained, "last report of the failed session should stay visible");

    hub.shutdown().await;
}

#[tokio::test]
async fn test_ingest_requires_identity() {
    let (hub, addr) = start_hub(None).await;

    let request = format!("ws://{addr}/api/v1/ingest")
        .into_client_request()
        .unwrap();
    match connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 400);
        }
        Err(e) => panic!("expected HTTP 400, got {e}"),
        Ok(_) => panic!("expected HTTP 400, got an open session"),
    }

    hub.shutdown().await;
}

#[tokio::test]
async fn test_history_returns_newest_first() {
    let (hub, addr) = start_hub(None).await;
    let mut ws = open_ingest(addr, "svc-hot").await.unwrap();

    send_report(&mut ws, report(91.0, 100.0, 1)).await;
    send_report(&mut ws, report(92.0, 100.0, 2)).await;
    send_report(&mut ws, report(93.0, 9000.0, 3)).await;
    ws.send(Message::Text(serde_json::to_string(&IngestFrame::End).unwrap()))
        .await
        .unwrap();
    read_until_close(&mut ws).await;

    let client = reqwest::Client::new();
    let alerts: Vec<AlertRecord> = client
        .get(format!("http://{addr}/api/v1/alerts/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alerts.len(), 4);
    assert!(alerts.iter().all(|a| a.service_id == "svc-hot"));
    assert!(alerts.windows(2).all(|w| w[0].triggered_at >= w[1].triggered_at));

    let limited: Vec<AlertRecord> = client
        .get(format!("http://{addr}/api/v1/alerts/history?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].observed_value, alerts[0].observed_value);

    let response = client
        .get(format!("http://{addr}/api/v1/alerts/history?limit=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_open_session_finishes_while_hub_drains() {
    let (hub, addr) = start_hub(None).await;
    let mut lifecycle = hub.subscribe();
    let sessions = hub.sessions().clone();

    let mut ws = open_ingest(addr, "svc-late").await.unwrap();
    for i in 0..3 {
        send_report(&mut ws, report(20.0, 512.0, i)).await;
    }
    assert!(eventually(|| async { sessions.open() == 1 }).await);

    let shutdown = tokio::spawn(hub.shutdown());
    let _ = lifecycle
        .wait_for(|state| *state == LifecycleState::Draining)
        .await
        .unwrap();

    // Draining refuses new agents but keeps the open stream going
    assert!(open_ingest(addr, "svc-new").await.is_err());
    send_report(&mut ws, report(21.0, 512.0, 3)).await;
    ws.send(Message::Text(serde_json::to_string(&IngestFrame::End).unwrap()))
        .await
        .unwrap();

    let (texts, code) = read_until_close(&mut ws).await;
    assert_eq!(code, Some(CloseCode::Normal));
    assert_eq!(texts.len(), 1);
    let summary: SessionSummary = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(summary, SessionSummary::success(4));

    tokio::time::timeout(Duration::from_secs(10), shutdown)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*lifecycle.borrow(), LifecycleState::Stopped);
    assert_eq!(sessions.open(), 0);
}

#[tokio::test]
async fn test_idle_session_is_cut_after_drain_timeout() {
    let mut config = hub_config(None);
    config.drain_timeout_secs = 1;
    let hub = Hub::start(config).await.unwrap();
    let addr = hub.local_addr().unwrap();

    let mut ws = open_ingest(addr, "svc-idle").await.unwrap();
    send_report(&mut ws, report(20.0, 512.0, 1)).await;
    let sessions = hub.sessions().clone();
    assert!(eventually(|| async { sessions.open() == 1 }).await);

    let shutdown = tokio::spawn(hub.shutdown());

    let (texts, code) = read_until_close(&mut ws).await;
    assert!(texts.is_empty());
    assert_eq!(code, Some(CloseCode::Away));

    tokio::time::timeout(Duration::from_secs(10), shutdown)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_auth_guards_query_routes_only() {
    let (hub, addr) = start_hub(Some("test-token")).await;
    let client = reqwest::Client::new();

    let response = get_status(addr, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], json!("missing Authorization header"));

    let response = client
        .get(format!("http://{addr}/api/v1/status"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_status(addr, Some("wrong")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], json!("invalid token"));
    assert_eq!(
        get_status(addr, Some("test-token")).await.status(),
        StatusCode::OK
    );

    let response = client
        .get(format!("http://{addr}/api/v1/stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Agents and health checks need no token
    let response = client
        .post(format!("http://{addr}/api/v1/register"))
        .header("service-id", "svc")
        .json(&json!({"os_version": "Linux", "agent_version": "v1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("http://{addr}/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(open_ingest(addr, "svc").await.is_ok());

    hub.shutdown().await;
}

#[tokio::test]
async fn test_stats_reports_pipeline() {
    let (hub, addr) = start_hub(None).await;

    let stats: Value = reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["lifecycle"], json!("running"));
    assert_eq!(stats["dispatcher"]["capacity"], json!(32));
    assert_eq!(stats["dispatcher"]["closed"], json!(false));
    assert_eq!(stats["workers"]["size"], json!(4));
    assert_eq!(stats["live_services"], json!(0));
    assert_eq!(stats["sink"]["total_raised"], json!(0));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_alert_stream_pushes_events() {
    let (hub, addr) = start_hub(None).await;

    let (mut viewer, _) = connect_async(format!("ws://{addr}/api/v1/alerts/stream"))
        .await
        .unwrap();
    // Let the server subscribe before the alert is raised
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut ws = open_ingest(addr, "svc-hot").await.unwrap();
    send_report(&mut ws, report(99.0, 1.0, 1)).await;

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Ok(Message::Text(text))) = viewer.next().await {
                return serde_json::from_str::<Value>(&text).unwrap();
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(event["type"], json!("alert"));
    assert_eq!(event["service_id"], json!("svc-hot"));
    assert_eq!(event["metric"], json!("CPU"));
    assert_eq!(event["observed_value"], json!(99.0));

    drop(ws);
    drop(viewer);
    hub.shutdown().await;
}

fn test_state(lifecycle: watch::Receiver<LifecycleState>) -> ApiState {
    let (dispatcher, _queues) = Dispatcher::new(4, 1);
    let sink = AlertSinkHandle::spawn(
        Box::new(MemoryAlertStore::new(10)),
        SinkConfig::default(),
        None,
    );
    ApiState::new(
        dispatcher,
        LiveState::new(),
        sink,
        WorkerStats::default(),
        lifecycle,
        SessionTracker::new(),
        500,
    )
}

fn test_settings() -> ApiSettings {
    ApiSettings {
        bind: "127.0.0.1:0".parse().unwrap(),
        token: None,
        cors: true,
    }
}

#[tokio::test]
async fn test_draining_hub_refuses_registration() {
    let (_tx, rx) = watch::channel(LifecycleState::Draining);
    let app = router(&test_settings(), test_state(rx));

    let request = Request::post("/api/v1/register")
        .header("service-id", "svc")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"os_version":"Linux","agent_version":"v1"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_ingest_refused_until_running() {
    let (tx, rx) = watch::channel(LifecycleState::Starting);
    let (addr, server) = spawn_api_server(&test_settings(), test_state(rx))
        .await
        .unwrap();

    match open_ingest(addr, "early").await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        Err(e) => panic!("expected HTTP 503, got {e}"),
        Ok(_) => panic!("expected HTTP 503, got an open session"),
    }

    tx.send_replace(LifecycleState::Running);
    assert!(open_ingest(addr, "on-time").await.is_ok());

    tx.send_replace(LifecycleState::Stopped);
    server.abort();
}
