//! AlertSinkActor - Records raised alerts
//!
//! Workers hand alerts over through a bounded channel and move on; the actor
//! does the slow part (store writes, webhook calls) on its own task. A worker
//! only waits here when the channel itself is full.
//!
//! ## Batching Strategy
//!
//! Alerts are buffered and written to the [`AlertStore`] in batches:
//! - **Size trigger**: Flush once `batch_size` alerts are buffered
//! - **Time trigger**: Flush every `flush_interval_ms`
//! - **Reads**: Flush before answering a history query, so reads see every raised alert
//!
//! A failed write is logged and counted, never reported back to workers. The
//! alert still counts as raised.
//!
//! ## Webhook
//!
//! Webhook calls run on a separate notifier task fed by a bounded channel.
//! When that backlog is full the notification is dropped and counted, so a
//! slow webhook never holds up the sink.

use tokio::sync::{broadcast, mpsc, mpsc::error::TrySendError, oneshot};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use anyhow::Context;

use crate::{
    alerts::{NOTIFY_BACKLOG, WebhookNotifier},
    config::SinkConfig,
    rules::AlertEvent,
    storage::{AlertRecord, AlertStore},
};

use super::messages::{SinkCommand, SinkStats};

/// Capacity of the live alert broadcast channel
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Actor that owns the alert store
pub struct AlertSinkActor {
    store: Box<dyn AlertStore>,

    command_rx: mpsc::Receiver<SinkCommand>,

    /// Live feed for websocket subscribers
    event_tx: broadcast::Sender<AlertEvent>,

    /// Backlog of the webhook notifier task
    notify_tx: Option<mpsc::Sender<AlertEvent>>,

    buffer: Vec<AlertRecord>,

    batch_size: usize,

    flush_interval: time::Duration,

    stats: SinkStats,
}

impl AlertSinkActor {
    pub fn new(
        store: Box<dyn AlertStore>,
        config: &SinkConfig,
        notify_tx: Option<mpsc::Sender<AlertEvent>>,
        command_rx: mpsc::Receiver<SinkCommand>,
        event_tx: broadcast::Sender<AlertEvent>,
    ) -> Self {
        Self {
            store,
            command_rx,
            event_tx,
            notify_tx,
            buffer: Vec::with_capacity(config.batch_size),
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
            stats: SinkStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert sink");

        match self.store.health_check().await {
            Ok(status) if status.healthy => debug!("alert store: {}", status.message),
            Ok(status) => warn!("alert store unhealthy: {}", status.message),
            Err(e) => warn!("alert store health check failed: {e}"),
        }

        let mut flush_timer = time::interval(self.flush_interval);
        flush_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            warn!("command channel closed, shutting down");
                            self.close().await;
                            break;
                        }
                    }
                }

                _ = flush_timer.tick() => {
                    if !self.buffer.is_empty() {
                        trace!("time trigger: flushing {} alerts", self.buffer.len());
                        let _ = self.flush().await;
                    }
                }
            }
        }

        debug!("alert sink stopped");
    }

    /// Returns false once the actor should stop
    async fn handle_command(&mut self, cmd: SinkCommand) -> bool {
        match cmd {
            SinkCommand::Forward(event) => self.record(event).await,

            SinkCommand::Flush { respond_to } => {
                let result = self.flush().await;
                let _ = respond_to.send(result);
            }

            SinkCommand::Recent { limit, respond_to } => {
                let _ = self.flush().await;
                let result = self
                    .store
                    .recent(limit)
                    .await
                    .context("failed to query alert history");
                let _ = respond_to.send(result);
            }

            SinkCommand::GetStats { respond_to } => {
                let stats = SinkStats {
                    buffer_size: self.buffer.len(),
                    ..self.stats.clone()
                };
                let _ = respond_to.send(stats);
            }

            SinkCommand::Shutdown { respond_to } => {
                debug!("received shutdown command");
                self.close().await;
                let _ = respond_to.send(());
                return false;
            }
        }

        true
    }

    async fn record(&mut self, event: AlertEvent) {
        self.stats.total_raised += 1;

        error!(
            service_id = %event.service_id,
            metric = %event.metric,
            value = event.observed_value,
            threshold = event.threshold,
            "critical alert"
        );

        if let Some(notify_tx) = &self.notify_tx {
            if let Err(e) = notify_tx.try_send(event.clone()) {
                self.stats.notifications_dropped += 1;
                match e {
                    TrySendError::Full(_) => warn!("webhook backlog full, dropping notification"),
                    TrySendError::Closed(_) => warn!("webhook notifier stopped, dropping notification"),
                }
            }
        }

        // No subscribers is fine
        let _ = self.event_tx.send(event.clone());

        self.buffer.push(event.into());
        if self.buffer.len() >= self.batch_size {
            trace!("size trigger: flushing {} alerts", self.buffer.len());
            let _ = self.flush().await;
        }
    }

    /// Write buffered alerts to the store
    ///
    /// On failure the batch is dropped and counted; the error is only returned
    /// to callers that asked for the flush explicitly.
    async fn flush(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len() as u64;
        self.stats.flush_count += 1;

        match self.store.insert_batch(batch).await {
            Ok(()) => {
                self.stats.total_persisted += count;
                debug!("persisted {count} alerts");
                Ok(())
            }
            Err(e) => {
                self.stats.persist_failures += count;
                error!("failed to persist {count} alerts: {e}");
                Err(e).context("failed to persist alerts")
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.flush().await;
        if let Err(e) = self.store.close().await {
            error!("failed to close alert store: {e}");
        }
        info!(
            "alert sink closed: {} raised, {} persisted, {} failed, {} notifications dropped",
            self.stats.total_raised,
            self.stats.total_persisted,
            self.stats.persist_failures,
            self.stats.notifications_dropped
        );
    }
}

/// Handle for talking to the AlertSinkActor
///
/// Cheap to clone; every worker holds one.
#[derive(Clone)]
pub struct AlertSinkHandle {
    sender: mpsc::Sender<SinkCommand>,
    event_tx: broadcast::Sender<AlertEvent>,
}

impl AlertSinkHandle {
    /// Spawn the sink actor
    pub fn spawn(
        store: Box<dyn AlertStore>,
        config: SinkConfig,
        notifier: Option<WebhookNotifier>,
    ) -> Self {
        let notify_tx = notifier.map(|notifier| notifier.spawn(NOTIFY_BACKLOG));
        Self::spawn_with_notify(store, config, notify_tx)
    }

    fn spawn_with_notify(
        store: Box<dyn AlertStore>,
        config: SinkConfig,
        notify_tx: Option<mpsc::Sender<AlertEvent>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.buffer.max(1));
        let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);

        let actor = AlertSinkActor::new(store, &config, notify_tx, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    /// Hand an alert to the sink, waiting only if its backlog is full
    pub async fn forward(&self, event: AlertEvent) -> anyhow::Result<()> {
        self.sender
            .send(SinkCommand::Forward(event))
            .await
            .context("alert sink is not running")
    }

    /// Force buffered alerts into the store
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SinkCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;
        rx.await.context("failed to receive response")?
    }

    /// Most recent alerts, newest first
    pub async fn recent(&self, limit: usize) -> anyhow::Result<Vec<AlertRecord>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SinkCommand::Recent {
                limit,
                respond_to: tx,
            })
            .await
            .context("failed to send Recent command")?;
        rx.await.context("failed to receive response")?
    }

    pub async fn stats(&self) -> Option<SinkStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SinkCommand::GetStats { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Live feed of raised alerts
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.event_tx.subscribe()
    }

    /// Flush, close the store and wait for the actor to stop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SinkCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
