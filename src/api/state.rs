//! API shared state containing actor handles

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{
    actors::{dispatcher::Dispatcher, sink::AlertSinkHandle, worker::WorkerStats},
    hub::LifecycleState,
    ingest::SessionTracker,
    state::LiveState,
};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Submission side of the fan-out queue, handed to every ingest session
    pub dispatcher: Dispatcher,

    /// Last known report per service
    pub live_state: LiveState,

    /// Handle to the alert sink for history queries and the live feed
    pub sink: AlertSinkHandle,

    pub worker_stats: WorkerStats,

    /// Hub lifecycle, used to refuse sessions while draining
    pub lifecycle: watch::Receiver<LifecycleState>,

    /// Open ingest sessions, waited on by the hub while draining
    pub sessions: SessionTracker,

    /// Interval handed to agents on registration
    pub report_interval_ms: u64,

    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(
        dispatcher: Dispatcher,
        live_state: LiveState,
        sink: AlertSinkHandle,
        worker_stats: WorkerStats,
        lifecycle: watch::Receiver<LifecycleState>,
        sessions: SessionTracker,
        report_interval_ms: u64,
    ) -> Self {
        Self {
            dispatcher,
            live_state,
            sink,
            worker_stats,
            lifecycle,
            sessions,
            report_interval_ms,
            started_at: Utc::now(),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    pub fn accepts_sessions(&self) -> bool {
        self.lifecycle_state().accepts_sessions()
    }
}
