//! Hub orchestration
//!
//! Owns every long-running part of the pipeline and moves it through
//! `Starting → Running → Draining → Stopped`. The current state is published
//! on a `watch` channel so the API can refuse new sessions while draining.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    actors::{
        dispatcher::Dispatcher,
        sink::AlertSinkHandle,
        worker::{WorkerPool, WorkerStats},
    },
    alerts::WebhookNotifier,
    config::Config,
    ingest::SessionTracker,
    state::LiveState,
    storage::open_store,
};

/// Where the hub is in its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// Only a running hub takes new sessions
    pub fn accepts_sessions(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(self, LifecycleState::Draining | LifecycleState::Stopped)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running ingestion hub
pub struct Hub {
    config: Config,
    dispatcher: Dispatcher,
    live_state: LiveState,
    sink: AlertSinkHandle,
    pool: WorkerPool,
    sessions: SessionTracker,
    lifecycle: watch::Sender<LifecycleState>,
    api: Option<(SocketAddr, JoinHandle<()>)>,
}

impl Hub {
    /// Build the store, sink, dispatcher, workers and API, then start running
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let (lifecycle, _) = watch::channel(LifecycleState::Starting);

        let store = open_store(&config.storage)
            .await
            .context("failed to open alert store")?;

        let notifier = config.webhook.clone().map(WebhookNotifier::new);
        let sink = AlertSinkHandle::spawn(store, config.sink.clone(), notifier);

        let (dispatcher, queues) = Dispatcher::new(config.queue_capacity, config.workers);
        let live_state = LiveState::new();
        let pool = WorkerPool::spawn(
            queues,
            live_state.clone(),
            Arc::new(config.rule_set()),
            sink.clone(),
        );

        let mut hub = Self {
            config,
            dispatcher,
            live_state,
            sink,
            pool,
            sessions: SessionTracker::new(),
            lifecycle,
            api: None,
        };

        #[cfg(feature = "api")]
        {
            let state = crate::api::ApiState::new(
                hub.dispatcher.clone(),
                hub.live_state.clone(),
                hub.sink.clone(),
                hub.pool.stats(),
                hub.lifecycle.subscribe(),
                hub.sessions.clone(),
                hub.config.report_interval_ms,
            );
            match crate::api::spawn_api_server(&hub.config.api, state).await {
                Ok(api) => hub.api = Some(api),
                Err(e) => {
                    hub.shutdown().await;
                    return Err(e.context("failed to start API server"));
                }
            }
        }

        hub.lifecycle.send_replace(LifecycleState::Running);
        info!(
            "hub running: {} workers, queue capacity {}, {} rules",
            hub.pool.size(),
            hub.dispatcher.capacity(),
            hub.config.rules.len()
        );

        Ok(hub)
    }

    pub fn state(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Address the API listens on, if it was started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.api.as_ref().map(|(addr, _)| *addr)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn live_state(&self) -> &LiveState {
        &self.live_state
    }

    pub fn sink(&self) -> &AlertSinkHandle {
        &self.sink
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.pool.stats()
    }

    /// Tracker of the ingest sessions currently open
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Drain queued work and stop every task
    ///
    /// New sessions are refused from the moment this is called. Open sessions
    /// get `drain_timeout` to end on their own and receive their summary.
    /// Then sessions still open are cut and the dispatcher closes. Workers
    /// get another `drain_timeout` to finish what is queued before they are
    /// aborted.
    pub async fn shutdown(self) {
        let Self {
            config,
            dispatcher,
            sink,
            pool,
            sessions,
            lifecycle,
            api,
            ..
        } = self;

        info!("hub draining");
        lifecycle.send_replace(LifecycleState::Draining);

        let grace = config.drain_timeout();
        if !sessions.wait_idle(grace).await {
            warn!(
                "{} sessions still open after {grace:?}, cutting them",
                sessions.open()
            );
        }
        sessions.stop_all();
        dispatcher.close();

        let aborted = pool.stop(grace).await;
        if aborted > 0 {
            warn!("{aborted} workers did not drain in time");
        }

        if let Some((addr, handle)) = api {
            debug!("waiting for API server on {addr} to stop");
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("API server still has open connections, aborting");
                abort.abort();
            }
        }

        sink.shutdown().await;

        lifecycle.send_replace(LifecycleState::Stopped);
        info!("hub stopped");
    }
}
