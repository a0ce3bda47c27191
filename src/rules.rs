//! Threshold rules and the alert evaluator
//!
//! A [`RuleSet`] is loaded once at startup and never changes afterwards.
//! Evaluation is a pure function of the report and the rules: the same input
//! always produces the same events, in rule order. Every matching rule fires on
//! its own; there is no short-circuit and no one-alert-per-report limit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{MetricReport, ServiceId};

/// Metric a rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricName {
    Cpu,
    Memory,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Cpu => "CPU",
            MetricName::Memory => "MEMORY",
        }
    }

    /// Read the value this metric refers to out of a report
    pub fn observe(&self, report: &MetricReport) -> f64 {
        match self {
            MetricName::Cpu => report.cpu_usage_percent,
            MetricName::Memory => report.memory_usage_mb,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CPU" => Ok(MetricName::Cpu),
            "MEMORY" => Ok(MetricName::Memory),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// A single threshold rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub metric: MetricName,
    pub threshold: f64,
}

impl AlertRule {
    pub fn new(metric: MetricName, threshold: f64) -> Self {
        Self { metric, threshold }
    }
}

/// An alert raised for one rule against one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub service_id: ServiceId,
    pub metric: MetricName,
    pub observed_value: f64,
    pub threshold: f64,

    /// Timestamp of the report that triggered the alert
    pub timestamp: DateTime<Utc>,
}

/// Ordered, immutable list of rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<AlertRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate a report against every rule, in order
    ///
    /// A rule fires when the observed value is strictly greater than its threshold.
    pub fn evaluate(&self, service_id: &str, report: &MetricReport) -> Vec<AlertEvent> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let observed = rule.metric.observe(report);
                if observed > rule.threshold {
                    trace!(
                        "{service_id}: {} {observed} exceeds {}",
                        rule.metric, rule.threshold
                    );
                    Some(AlertEvent {
                        service_id: service_id.to_string(),
                        metric: rule.metric,
                        observed_value: observed,
                        threshold: rule.threshold,
                        timestamp: report.timestamp,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

impl From<Vec<AlertRule>> for RuleSet {
    fn from(rules: Vec<AlertRule>) -> Self {
        Self::new(rules)
    }
}
