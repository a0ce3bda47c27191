//! Per-connection ingestion sessions
//!
//! An [`IngestSession`] owns one agent connection from the first report to the
//! end of the stream. It knows nothing about the wire: the transport hands it
//! a stream of decoded reports (or a transport failure) and gets back either a
//! [`SessionSummary`] or an [`IngestError`].
//!
//! ```text
//! frames ─► Stream<Result<MetricReport, E>> ─► IngestSession::run ─► Dispatcher
//!                                                      │
//!                          clean end: retire + summary ┘   error: entry kept
//! ```

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    MetricReport, ServiceId, SessionSummary,
    actors::{
        dispatcher::{DispatchError, Dispatcher},
        messages::DispatchEnvelope,
    },
    state::LiveState,
};

/// Ways an ingestion session can fail
#[derive(Debug, Error)]
pub enum IngestError {
    /// The agent did not present a usable identity; no stream was started
    #[error("registration rejected: {0}")]
    Registration(String),

    /// The connection broke or delivered something that is not a report
    #[error("transport error: {0}")]
    Transport(String),

    /// The hub stopped accepting work mid-session
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Handler for a single agent connection
#[derive(Debug)]
pub struct IngestSession {
    service_id: ServiceId,
    dispatcher: Dispatcher,
    state: LiveState,
    received: u64,
}

impl IngestSession {
    pub fn new(service_id: impl Into<ServiceId>, dispatcher: Dispatcher, state: LiveState) -> Self {
        Self {
            service_id: service_id.into(),
            dispatcher,
            state,
            received: 0,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Reports accepted so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Drive the session until the stream ends
    ///
    /// Every report is submitted to the dispatcher, waiting while it is full.
    /// On a clean end the service is retired from the live state before the
    /// summary is returned. On a transport error the live entry is left as it
    /// is and the error is returned.
    #[instrument(skip(self, reports), fields(service_id = %self.service_id))]
    pub async fn run<S, E>(mut self, reports: S) -> Result<SessionSummary, IngestError>
    where
        S: Stream<Item = Result<MetricReport, E>>,
        E: Display,
    {
        info!("session started");
        let mut reports = std::pin::pin!(reports);

        while let Some(next) = reports.next().await {
            let report = match next {
                Ok(report) => report,
                Err(e) => {
                    warn!(
                        "session failed after {} reports: {e}, keeping last known state",
                        self.received
                    );
                    return Err(IngestError::Transport(e.to_string()));
                }
            };

            self.dispatcher
                .submit(DispatchEnvelope::new(self.service_id.clone(), report))
                .await?;
            self.received += 1;
            trace!("submitted report #{}", self.received);
        }

        self.retire().await;

        info!("session closed cleanly after {} reports", self.received);
        Ok(SessionSummary::success(self.received))
    }

    /// Remove the service once every report it submitted has been applied
    ///
    /// The removal goes through the service's worker, behind its queued
    /// reports, even when the dispatcher is already closed. Only when no worker
    /// is left to apply anything is the entry removed here.
    async fn retire(&self) {
        match self.dispatcher.retire(&self.service_id).await {
            Ok(done) => {
                if done.await.is_err() {
                    debug!("worker stopped before retiring, removing live entry directly");
                    self.state.remove(&self.service_id).await;
                }
            }
            Err(e) => {
                debug!("{e}, removing live entry directly");
                self.state.remove(&self.service_id).await;
            }
        }
    }
}

/// Counts open sessions so shutdown can wait for them
///
/// The hub stops taking new sessions first, waits here for the open ones to
/// finish, and only then closes the dispatcher. Sessions still open after the
/// grace period are told to stop.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    open: Arc<watch::Sender<usize>>,
    stop: Arc<watch::Sender<bool>>,
}

/// Marks one open session until dropped
#[derive(Debug)]
pub struct SessionGuard {
    open: Arc<watch::Sender<usize>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            open: Arc::new(watch::Sender::new(0)),
            stop: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn enter(&self) -> SessionGuard {
        self.open.send_modify(|open| *open += 1);
        SessionGuard {
            open: self.open.clone(),
        }
    }

    /// Sessions currently open
    pub fn open(&self) -> usize {
        *self.open.borrow()
    }

    /// Wait up to `grace` for every open session to finish
    ///
    /// Returns false if sessions were still open when the time ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let mut open = self.open.subscribe();
        tokio::time::timeout(grace, async move {
            let _ = open.wait_for(|open| *open == 0).await;
        })
        .await
        .is_ok()
    }

    /// Tell every remaining session to stop
    pub fn stop_all(&self) {
        self.stop.send_replace(true);
    }

    /// Resolves once [`stop_all`](Self::stop_all) was called
    pub async fn stopped(&self) {
        let mut stop = self.stop.subscribe();
        let _ = stop.wait_for(|stop| *stop).await;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.open.send_modify(|open| *open = open.saturating_sub(1));
    }
}
