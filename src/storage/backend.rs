//! Alert store trait definition

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::AlertRecord;

/// Health status of the alert store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional store-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable record of raised alerts
///
/// The sink actor is the only writer. Reads come from the sink as well, so an
/// implementation only has to be `Send + Sync`, not internally ordered.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert a batch of alerts
    ///
    /// Implementations should write the batch atomically where the backend allows it.
    async fn insert_batch(&self, alerts: Vec<AlertRecord>) -> StorageResult<()>;

    /// Most recent alerts, newest first
    async fn recent(&self, limit: usize) -> StorageResult<Vec<AlertRecord>>;

    /// Total number of stored alerts
    async fn count(&self) -> StorageResult<u64>;

    /// Check store health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release resources; further writes fail
    async fn close(&self) -> StorageResult<()>;
}
