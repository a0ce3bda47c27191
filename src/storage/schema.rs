//! Stored alert row
//!
//! Alerts are stored flat: one row per raised alert, with the metric kept as
//! its wire name (`CPU`, `MEMORY`) so the table stays readable from a SQL shell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{AlertEvent, MetricName};

/// A single alert as held by an [`AlertStore`](super::AlertStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Store-assigned identifier (None until persisted)
    pub id: Option<i64>,

    pub service_id: String,

    pub metric: MetricName,

    pub observed_value: f64,

    pub threshold: f64,

    /// When the triggering report was taken (always UTC)
    pub triggered_at: DateTime<Utc>,
}

impl From<AlertEvent> for AlertRecord {
    fn from(event: AlertEvent) -> Self {
        Self {
            id: None,
            service_id: event.service_id,
            metric: event.metric,
            observed_value: event.observed_value,
            threshold: event.threshold,
            triggered_at: event.timestamp,
        }
    }
}
