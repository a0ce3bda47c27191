//! Shared API request and response types
//!
//! Response bodies are plain serde types so the agent simulator and the
//! integration tests can decode exactly what the handlers encode.

use serde::{Deserialize, Serialize};

use crate::{actors::messages::SinkStats, hub::LifecycleState};

/// Default number of alerts returned by the history endpoint
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound on the history endpoint's `limit`
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" while running, otherwise the lifecycle state
    pub status: String,
    pub lifecycle: String,
    pub timestamp: String,
}

/// Query parameters for `GET /api/v1/alerts/history`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Requested limit, defaulted and capped
    ///
    /// Returns `None` for a limit of zero.
    pub fn effective_limit(&self) -> Option<usize> {
        match self.limit {
            None => Some(DEFAULT_HISTORY_LIMIT),
            Some(0) => None,
            Some(limit) => Some(limit.min(MAX_HISTORY_LIMIT)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Items queued but not yet taken by a worker
    pub depth: usize,
    pub capacity: usize,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub size: usize,
    pub processed: u64,
    pub alerts_raised: u64,
}

/// Response of `GET /api/v1/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,
    pub lifecycle: LifecycleState,
    pub uptime_secs: i64,
    pub dispatcher: DispatcherStats,
    pub workers: WorkerPoolStats,
    pub live_services: usize,

    /// Missing when the sink has already stopped
    pub sink: Option<SinkStats>,
}
