//! Fan-out dispatcher - bounded, routed queue between sessions and workers
//!
//! ## Capacity
//!
//! All workers share one capacity budget, enforced by a fair semaphore. A
//! submission first acquires a slot (waiting in arrival order while the
//! dispatcher is full), then pushes the item onto its worker's queue. The slot
//! travels with the item and is released the moment a worker takes it, which
//! wakes the oldest blocked submitter.
//!
//! ## Routing
//!
//! ```text
//! session A ─┐                   ┌─► queue 0 ─► worker 0
//! session B ─┼─► hash(service) ──┼─► queue 1 ─► worker 1
//! session C ─┘                   └─► queue N ─► worker N
//! ```
//!
//! A service always hashes to the same worker, so its items are applied in
//! the order they were submitted.
//!
//! ## Closing
//!
//! Closing refuses new reports, but a retirement is still queued on the
//! service's route without a slot. It lands behind the reports already queued
//! there, so a draining worker cannot put a retired service back.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tracing::{debug, trace};

use super::messages::{DispatchEnvelope, WorkItem};

/// Errors returned when handing work to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts work (hub is draining)
    #[error("dispatcher is closed")]
    Closed,

    /// The worker owning this route has exited
    #[error("worker {0} is no longer running")]
    WorkerGone(usize),
}

/// An item sitting in a worker queue
///
/// Holds one capacity slot, except for retirements queued after close.
#[derive(Debug)]
struct Queued {
    item: WorkItem,
    _slot: Option<OwnedSemaphorePermit>,
}

#[derive(Debug)]
struct Inner {
    slots: Arc<Semaphore>,
    capacity: usize,
    queues: Vec<mpsc::UnboundedSender<Queued>>,
}

/// Cloneable submission side of the dispatcher
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Receiving side owned by a single worker
#[derive(Debug)]
pub struct WorkerQueue {
    index: usize,
    receiver: mpsc::UnboundedReceiver<Queued>,
}

impl Dispatcher {
    /// Create a dispatcher with a total `capacity` spread over `workers` queues
    ///
    /// Both values are clamped to at least 1. Returns one [`WorkerQueue`] per worker.
    pub fn new(capacity: usize, workers: usize) -> (Self, Vec<WorkerQueue>) {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        let workers = workers.max(1);

        let (queues, receivers): (Vec<_>, Vec<_>) = (0..workers)
            .map(|index| {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    tx,
                    WorkerQueue {
                        index,
                        receiver: rx,
                    },
                )
            })
            .unzip();

        debug!("dispatcher created with capacity {capacity} over {workers} workers");

        let dispatcher = Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(capacity)),
                capacity,
                queues,
            }),
        };

        (dispatcher, receivers)
    }

    /// Worker index a service is pinned to
    pub fn route(&self, service_id: &str) -> usize {
        route(service_id, self.inner.queues.len())
    }

    /// Queue a report, waiting while the dispatcher is at capacity
    pub async fn submit(&self, envelope: DispatchEnvelope) -> Result<(), DispatchError> {
        self.enqueue(WorkItem::Report(envelope)).await
    }

    /// Queue the removal of a service behind everything already submitted for it
    ///
    /// The returned receiver resolves once the worker has removed the entry.
    /// This still succeeds after [`close`](Self::close), as long as the
    /// service's worker is running.
    pub async fn retire(&self, service_id: &str) -> Result<oneshot::Receiver<()>, DispatchError> {
        let (done, rx) = oneshot::channel();
        let item = WorkItem::Retire {
            service_id: service_id.to_string(),
            done,
        };

        let slot = self.inner.slots.clone().acquire_owned().await.ok();
        if slot.is_none() {
            trace!("dispatcher closed, queueing retirement of {service_id} without a slot");
        }
        self.push(item, slot)?;
        Ok(rx)
    }

    async fn enqueue(&self, item: WorkItem) -> Result<(), DispatchError> {
        let slot = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        self.push(item, Some(slot))
    }

    fn push(&self, item: WorkItem, slot: Option<OwnedSemaphorePermit>) -> Result<(), DispatchError> {
        let index = self.route(item.service_id());

        self.inner.queues[index]
            .send(Queued { item, _slot: slot })
            .map_err(|_| DispatchError::WorkerGone(index))?;

        trace!("queued item for worker {index}");
        Ok(())
    }

    /// Stop accepting reports; items already queued are still delivered
    pub fn close(&self) {
        debug!("closing dispatcher with {} queued items", self.depth());
        self.inner.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.slots.is_closed()
    }

    /// Number of items queued but not yet taken by a worker
    pub fn depth(&self) -> usize {
        self.inner
            .capacity
            .saturating_sub(self.inner.slots.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn workers(&self) -> usize {
        self.inner.queues.len()
    }
}

impl WorkerQueue {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the oldest item routed to this worker
    ///
    /// Returns `None` once every dispatcher handle is gone and the queue is empty.
    pub async fn take(&mut self) -> Option<WorkItem> {
        let Queued { item, _slot } = self.receiver.recv().await?;
        Some(item)
    }

    /// Take an item without waiting
    pub fn try_take(&mut self) -> Option<WorkItem> {
        let Queued { item, _slot } = self.receiver.try_recv().ok()?;
        Some(item)
    }
}

/// Deterministic service-to-worker mapping
pub fn route(service_id: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    service_id.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}
