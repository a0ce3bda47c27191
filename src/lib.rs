pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod hub;
pub mod ingest;
pub mod rules;
pub mod state;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque name of a connected agent, fixed for the lifetime of its connection.
pub type ServiceId = String;

/// A single telemetry sample pushed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub request_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Metadata an agent sends when it registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub os_version: String,
    pub agent_version: String,
}

/// Configuration handed back to a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub report_interval_ms: u64,
    pub active: bool,
}

/// Result of a cleanly closed ingestion session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_reports_received: u64,
    pub status: String,
}

impl SessionSummary {
    pub const SUCCESS: &'static str = "SUCCESS";

    pub fn success(total_reports_received: u64) -> Self {
        Self {
            total_reports_received,
            status: Self::SUCCESS.to_string(),
        }
    }
}

/// A text frame on the ingestion websocket.
///
/// Agents send one `report` frame per sample and finish with `end`; the hub
/// answers `end` with the [`SessionSummary`] and closes the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestFrame {
    Report(MetricReport),
    End,
}
