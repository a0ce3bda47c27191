//! Hub start-up and graceful shutdown

use assert_matches::assert_matches;
use watchtower::{
    actors::{dispatcher::DispatchError, messages::DispatchEnvelope},
    config::Config,
    hub::{Hub, LifecycleState},
};

use crate::helpers::{hub_config, report};

#[tokio::test]
async fn test_start_and_shutdown_transitions() {
    let hub = Hub::start(hub_config(None)).await.unwrap();
    assert_eq!(hub.state(), LifecycleState::Running);

    #[cfg(feature = "api")]
    assert!(hub.local_addr().is_some());

    let lifecycle = hub.subscribe();
    hub.shutdown().await;

    assert_eq!(*lifecycle.borrow(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_drains_queued_work() {
    let hub = Hub::start(hub_config(None)).await.unwrap();
    let dispatcher = hub.dispatcher().clone();
    let state = hub.live_state().clone();
    let stats = hub.worker_stats();

    for i in 0..300u64 {
        dispatcher
            .submit(DispatchEnvelope::new(format!("svc-{}", i % 10), report(95.0, 1.0, i)))
            .await
            .unwrap();
    }

    hub.shutdown().await;

    assert_eq!(stats.processed(), 300);
    assert_eq!(stats.alerts_raised(), 300);
    assert_eq!(state.len().await, 10);

    assert_matches!(
        dispatcher
            .submit(DispatchEnvelope::new("svc-0", report(1.0, 1.0, 0)))
            .await,
        Err(DispatchError::Closed)
    );
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = Config {
        workers: 0,
        ..hub_config(None)
    };
    assert!(Hub::start(config).await.is_err());
}
