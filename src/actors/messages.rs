//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Work items**: Routed from ingestion sessions to exactly one worker
//! 2. **Commands**: Request/response messages sent to the sink actor via mpsc
//! 3. **Events**: Alert events broadcast to any number of live subscribers

use tokio::sync::oneshot;

use crate::{MetricReport, ServiceId, rules::AlertEvent, storage::AlertRecord};

/// A report tagged with the service it came from
///
/// Owned by the dispatcher from submission until a worker takes it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEnvelope {
    pub service_id: ServiceId,
    pub report: MetricReport,
}

impl DispatchEnvelope {
    pub fn new(service_id: impl Into<ServiceId>, report: MetricReport) -> Self {
        Self {
            service_id: service_id.into(),
            report,
        }
    }
}

/// Unit of work queued for a worker
#[derive(Debug)]
pub enum WorkItem {
    /// Apply a report to the live state and evaluate it
    Report(DispatchEnvelope),

    /// Drop a service from the live state once everything queued before it is applied
    ///
    /// Sent by a session on clean end-of-stream. `done` fires after removal.
    Retire {
        service_id: ServiceId,
        done: oneshot::Sender<()>,
    },
}

impl WorkItem {
    pub fn service_id(&self) -> &str {
        match self {
            WorkItem::Report(envelope) => &envelope.service_id,
            WorkItem::Retire { service_id, .. } => service_id,
        }
    }
}

/// Commands that can be sent to the AlertSinkActor
#[derive(Debug)]
pub enum SinkCommand {
    /// Record a raised alert
    Forward(AlertEvent),

    /// Flush buffered alerts to the store
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Most recent stored alerts, newest first
    Recent {
        limit: usize,
        respond_to: oneshot::Sender<anyhow::Result<Vec<AlertRecord>>>,
    },

    /// Get sink statistics
    GetStats {
        respond_to: oneshot::Sender<SinkStats>,
    },

    /// Flush, close the store and stop
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Sink statistics
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SinkStats {
    /// Alerts received from workers
    pub total_raised: u64,

    /// Alerts written to the store
    pub total_persisted: u64,

    /// Alerts dropped because the store rejected them
    pub persist_failures: u64,

    /// Webhook notifications dropped because the notifier backlog was full
    pub notifications_dropped: u64,

    /// Alerts waiting in the write buffer
    pub buffer_size: usize,

    /// Number of flush operations performed
    pub flush_count: u64,
}
