//! SQLite alert store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Reads for the history endpoint don't block the sink's writes
//! - **Migrations**: Schema versioned with sqlx (`./migrations`)
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{AlertStore, HealthStatus};
use super::error::{StorageError, StorageResult};
use super::schema::AlertRecord;

/// SQLite-backed alert history
pub struct SqliteAlertStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteAlertStore {
    /// Open (or create) the database and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use watchtower::storage::sqlite::SqliteAlertStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteAlertStore::new("./alerts.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite alert store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("SQLite alert store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn insert_batch(&self, alerts: Vec<AlertRecord>) -> StorageResult<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for alert in alerts {
            sqlx::query(
                r#"
                INSERT INTO alerts (service_id, metric, observed_value, threshold, triggered_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&alert.service_id)
            .bind(alert.metric.as_str())
            .bind(alert.observed_value)
            .bind(alert.threshold)
            .bind(alert.triggered_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: usize) -> StorageResult<Vec<AlertRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, service_id, metric, observed_value, threshold, triggered_at
            FROM alerts
            ORDER BY triggered_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let metric: String = row.get("metric");
                Ok(AlertRecord {
                    id: Some(row.get("id")),
                    service_id: row.get("service_id"),
                    metric: metric.parse().map_err(StorageError::SerializationError)?,
                    observed_value: row.get("observed_value"),
                    threshold: row.get("threshold"),
                    triggered_at: Self::millis_to_timestamp(row.get("triggered_at")),
                })
            })
            .collect()
    }

    async fn count(&self) -> StorageResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite alert store operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
