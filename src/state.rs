//! Live state store
//!
//! Holds the most recently processed [`MetricReport`] per service. Callers only
//! see `update`, `remove` and `snapshot`; the lock behind them is never handed
//! out, and every critical section is a single map operation or a clone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::trace;

use crate::{MetricReport, ServiceId};

/// Shared, cloneable handle to the live per-service state
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    entries: Arc<RwLock<HashMap<ServiceId, MetricReport>>>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for a service
    pub async fn update(&self, service_id: &str, report: MetricReport) {
        let mut entries = self.entries.write().await;
        entries.insert(service_id.to_string(), report);
        trace!("live state updated for {service_id}");
    }

    /// Remove the entry for a service, returning whether one was present
    pub async fn remove(&self, service_id: &str) -> bool {
        let removed = self.entries.write().await.remove(service_id).is_some();
        trace!("live state remove for {service_id}: removed={removed}");
        removed
    }

    /// Point-in-time copy of every entry
    pub async fn snapshot(&self) -> HashMap<ServiceId, MetricReport> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, service_id: &str) -> Option<MetricReport> {
        self.entries.read().await.get(service_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
