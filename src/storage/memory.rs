//! In-memory alert store (no persistence)
//!
//! Keeps the most recent alerts in a ring buffer. When the buffer is full the
//! oldest alert is evicted.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: Only the newest `capacity` alerts are kept

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{AlertStore, HealthStatus};
use super::error::{StorageError, StorageResult};
use super::schema::AlertRecord;

/// Default number of alerts kept in memory
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Default)]
struct Ring {
    alerts: VecDeque<AlertRecord>,
    next_id: i64,
    total_inserted: u64,
    closed: bool,
}

/// Ring-buffer alert store
#[derive(Debug)]
pub struct MemoryAlertStore {
    capacity: usize,
    ring: RwLock<Ring>,
}

impl MemoryAlertStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: RwLock::new(Ring {
                next_id: 1,
                ..Ring::default()
            }),
        }
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert_batch(&self, alerts: Vec<AlertRecord>) -> StorageResult<()> {
        let mut ring = self.ring.write().await;
        if ring.closed {
            return Err(StorageError::Closed);
        }

        for mut alert in alerts {
            alert.id = Some(ring.next_id);
            ring.next_id += 1;
            ring.total_inserted += 1;

            if ring.alerts.len() == self.capacity {
                ring.alerts.pop_front();
            }
            ring.alerts.push_back(alert);
        }

        debug!("in-memory store holds {} alerts", ring.alerts.len());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<AlertRecord>> {
        let ring = self.ring.read().await;
        Ok(ring.alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.ring.read().await.alerts.len() as u64)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let ring = self.ring.read().await;
        Ok(HealthStatus {
            healthy: !ring.closed,
            message: if ring.closed {
                "In-memory alert store closed".to_string()
            } else {
                "In-memory alert store operational".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("capacity".to_string(), self.capacity.to_string()),
                ("total_inserted".to_string(), ring.total_inserted.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory alert store");
        self.ring.write().await.closed = true;
        Ok(())
    }
}
