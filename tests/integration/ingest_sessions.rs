//! Ingestion session lifecycle against a running worker pool

use assert_matches::assert_matches;
use futures::stream;
use pretty_assertions::assert_eq;
use watchtower::{
    MetricReport, SessionSummary,
    actors::dispatcher::DispatchError,
    ingest::IngestError,
};

use crate::helpers::{TestPipeline, default_rules, report};

#[tokio::test]
async fn test_clean_close_removes_service() {
    let pipeline = TestPipeline::new(4, 3, default_rules());

    let reports: Vec<Result<MetricReport, String>> =
        (0..25).map(|i| Ok(report(20.0, 512.0, i))).collect();
    let summary = pipeline
        .session("svc-1")
        .run(stream::iter(reports))
        .await
        .unwrap();

    assert_eq!(
        summary,
        SessionSummary {
            total_reports_received: 25,
            status: "SUCCESS".to_string(),
        }
    );
    assert!(pipeline.state.get("svc-1").await.is_none());

    let stats = pipeline.finish().await;
    assert_eq!(stats.processed(), 25);
}

#[tokio::test]
async fn test_error_mid_stream_retains_last_report() {
    let pipeline = TestPipeline::new(4, 3, default_rules());
    let state = pipeline.state.clone();

    let reports = stream::iter(vec![
        Ok(report(10.0, 100.0, 1)),
        Ok(report(11.0, 100.0, 2)),
        Ok(report(12.0, 100.0, 3)),
        Err("stream reset by peer"),
    ]);
    let result = pipeline.session("svc-2").run(reports).await;
    assert_matches!(result, Err(IngestError::Transport(_)));

    pipeline.finish().await;

    let retained = state.get("svc-2").await.unwrap();
    assert_eq!(retained.request_count, 3);
    assert_eq!(retained.cpu_usage_percent, 12.0);
}

#[tokio::test]
async fn test_concurrent_sessions_mixed_outcomes() {
    let pipeline = TestPipeline::new(8, 4, default_rules());

    let mut sessions = vec![];
    for id in 0..120u64 {
        let session = pipeline.session(&format!("service-agent-{id:03}"));
        sessions.push(tokio::spawn(async move {
            let mut frames: Vec<Result<MetricReport, String>> =
                (0..15).map(|i| Ok(report(50.0, 1000.0, id * 100 + i))).collect();
            // Every third agent loses its connection after the last report
            if id % 3 == 0 {
                frames.push(Err("connection dropped".to_string()));
            }
            (id, session.run(stream::iter(frames)).await)
        }));
    }

    for session in sessions {
        let (id, result) = session.await.unwrap();
        if id % 3 == 0 {
            assert_matches!(result, Err(IngestError::Transport(_)));
        } else {
            assert_eq!(result.unwrap(), SessionSummary::success(15));
        }
    }

    let state = pipeline.state.clone();
    let stats = pipeline.finish().await;
    assert_eq!(stats.processed(), 120 * 15);

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.len(), 40);
    for id in (0..120u64).filter(|id| id % 3 == 0) {
        assert_eq!(
            snapshot[&format!("service-agent-{id:03}")].request_count,
            id * 100 + 14
        );
    }
}

#[tokio::test]
async fn test_session_after_close_gets_dispatch_error() {
    let pipeline = TestPipeline::new(4, 2, default_rules());
    pipeline.dispatcher.close();

    let result = pipeline
        .session("late")
        .run(stream::iter(vec![Ok::<_, String>(report(1.0, 1.0, 1))]))
        .await;
    assert_matches!(result, Err(IngestError::Dispatch(DispatchError::Closed)));

    pipeline.finish().await;
}

#[tokio::test]
async fn test_backpressure_does_not_lose_reports() {
    // A single slot shared by many sessions
    let pipeline = TestPipeline::new(1, 2, default_rules());

    let mut sessions = vec![];
    for id in 0..20u64 {
        let session = pipeline.session(&format!("svc-{id}"));
        sessions.push(tokio::spawn(async move {
            let frames: Vec<Result<MetricReport, String>> =
                (0..50).map(|i| Ok(report(1.0, 1.0, i))).collect();
            session.run(stream::iter(frames)).await
        }));
    }

    for session in sessions {
        assert_eq!(session.await.unwrap().unwrap().total_reports_received, 50);
    }

    let state = pipeline.state.clone();
    let stats = pipeline.finish().await;
    assert_eq!(stats.processed(), 1000);
    assert!(state.is_empty().await);
}
