//! Worker pool - drains routed queues into the live state and the evaluator
//!
//! ## Message Flow
//!
//! ```text
//! WorkerQueue ─► take() ─► LiveState::update ─► RuleSet::evaluate ─► AlertSinkHandle
//!      ↑
//!      └─── stop signal (drain what is queued, then exit)
//! ```
//!
//! No lock on the live state is held while evaluating or forwarding: the
//! update is a single awaited call that completes before evaluation starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::{rules::RuleSet, state::LiveState};

use super::dispatcher::WorkerQueue;
use super::messages::{DispatchEnvelope, WorkItem};
use super::sink::AlertSinkHandle;

/// Counters shared by all workers of a pool
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    processed: Arc<AtomicU64>,
    alerts_raised: Arc<AtomicU64>,
}

impl WorkerStats {
    /// Reports applied to the live state
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Alert events produced by the evaluator
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }
}

/// A single consumer bound to one routed queue
pub struct Worker {
    queue: WorkerQueue,
    state: LiveState,
    rules: Arc<RuleSet>,
    sink: AlertSinkHandle,
    stop_rx: watch::Receiver<bool>,
    stats: WorkerStats,
}

impl Worker {
    /// Run until the stop signal arrives or every dispatcher handle is dropped
    #[instrument(skip(self), fields(worker = self.queue.index()))]
    pub async fn run(mut self) {
        debug!("starting worker");

        loop {
            tokio::select! {
                biased;

                item = self.queue.take() => {
                    match item {
                        Some(item) => self.process(item).await,
                        None => {
                            debug!("dispatcher dropped, stopping");
                            break;
                        }
                    }
                }

                _ = self.stop_rx.changed() => {
                    let mut drained = 0usize;
                    while let Some(item) = self.queue.try_take() {
                        self.process(item).await;
                        drained += 1;
                    }
                    debug!("stop requested, drained {drained} remaining items");
                    break;
                }
            }
        }

        debug!("worker stopped");
    }

    async fn process(&self, item: WorkItem) {
        match item {
            WorkItem::Report(DispatchEnvelope { service_id, report }) => {
                self.state.update(&service_id, report.clone()).await;
                self.stats.processed.fetch_add(1, Ordering::Relaxed);

                let events = self.rules.evaluate(&service_id, &report);
                trace!("{service_id}: {} alerts", events.len());

                for event in events {
                    self.stats.alerts_raised.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.sink.forward(event).await {
                        warn!("failed to hand alert to sink: {e:#}");
                    }
                }
            }

            WorkItem::Retire { service_id, done } => {
                let removed = self.state.remove(&service_id).await;
                debug!("{service_id}: retired from live state (present: {removed})");
                let _ = done.send(());
            }
        }
    }
}

/// Fixed-size set of workers, one per dispatcher queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stop_tx: watch::Sender<bool>,
    stats: WorkerStats,
}

impl WorkerPool {
    /// Spawn one worker task per queue
    pub fn spawn(
        queues: Vec<WorkerQueue>,
        state: LiveState,
        rules: Arc<RuleSet>,
        sink: AlertSinkHandle,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = WorkerStats::default();

        let handles = queues
            .into_iter()
            .map(|queue| {
                let worker = Worker {
                    queue,
                    state: state.clone(),
                    rules: rules.clone(),
                    sink: sink.clone(),
                    stop_rx: stop_rx.clone(),
                    stats: stats.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        debug!("spawned {} workers", handles.len());

        Self {
            handles,
            stop_tx,
            stats,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.clone()
    }

    /// Signal every worker to drain its queue and exit
    ///
    /// Workers still running after `grace` are aborted. Returns how many were aborted.
    pub async fn stop(mut self, grace: Duration) -> usize {
        let _ = self.stop_tx.send(true);

        if tokio::time::timeout(grace, join_all(self.handles.iter_mut()))
            .await
            .is_ok()
        {
            debug!("all workers drained");
            return 0;
        }

        let mut aborted = 0;
        for handle in &self.handles {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }

        warn!("drain timeout of {grace:?} expired, aborted {aborted} workers");
        aborted
    }
}
