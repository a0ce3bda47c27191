use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::config::Webhook;
use crate::rules::{AlertEvent, MetricName};

/// Alerts waiting for webhook delivery before new ones are dropped
pub const NOTIFY_BACKLOG: usize = 64;

/// Upper bound for a single webhook call
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts raised alerts to a generic webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook: Webhook,
}

impl WebhookNotifier {
    pub fn new(webhook: Webhook) -> Self {
        Self::with_timeout(webhook, NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(webhook: Webhook, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            error!("failed to build webhook client with timeout: {e}");
            Client::new()
        });
        Self { client, webhook }
    }

    /// Deliver alerts one at a time on a dedicated task
    ///
    /// The returned sender holds at most `backlog` alerts. The task exits once
    /// every sender is dropped and the backlog is delivered.
    pub fn spawn(self, backlog: usize) -> mpsc::Sender<AlertEvent> {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(backlog.max(1));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.send(&event).await;
            }
            debug!("webhook notifier stopped");
        });

        tx
    }

    pub fn format_message(event: &AlertEvent) -> String {
        match event.metric {
            MetricName::Cpu => format!(
                "⚠️ **CPU Usage Alert**: Service `{}` CPU usage is **{:.1}%** (limit: {}%)",
                event.service_id, event.observed_value, event.threshold
            ),
            MetricName::Memory => format!(
                "🔥 **Memory Alert**: Service `{}` uses **{:.1} MB** (limit: {} MB)",
                event.service_id, event.observed_value, event.threshold
            ),
        }
    }

    /// Best-effort delivery; failures are logged and swallowed
    #[instrument(skip(self, event), fields(service_id = %event.service_id))]
    pub async fn send(&self, event: &AlertEvent) {
        let payload = json!({
            "message": Self::format_message(event),
            "service": event.service_id,
            "metric": event.metric,
            "value": event.observed_value,
            "threshold": event.threshold,
            "timestamp": event.timestamp.to_rfc3339()
        });

        match self.client.post(&self.webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}
