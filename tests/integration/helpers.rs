//! Test helpers shared by the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use watchtower::{
    MetricReport,
    actors::{
        dispatcher::Dispatcher,
        sink::AlertSinkHandle,
        worker::{WorkerPool, WorkerStats},
    },
    config::{ApiSettings, Config, SinkConfig, StorageConfig},
    ingest::IngestSession,
    rules::{AlertRule, MetricName, RuleSet},
    state::LiveState,
    storage::memory::MemoryAlertStore,
};

/// Create a report with the given values and the current time
pub fn report(cpu: f64, memory: f64, request_count: u64) -> MetricReport {
    MetricReport {
        cpu_usage_percent: cpu,
        memory_usage_mb: memory,
        request_count,
        timestamp: Utc::now(),
    }
}

/// Default rules: CPU above 90, memory above 8000
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(MetricName::Cpu, 90.0),
        AlertRule::new(MetricName::Memory, 8000.0),
    ]
}

/// Dispatcher, workers, live state and sink wired together in memory
pub struct TestPipeline {
    pub dispatcher: Dispatcher,
    pub state: LiveState,
    pub sink: AlertSinkHandle,
    pool: WorkerPool,
}

impl TestPipeline {
    pub fn new(capacity: usize, workers: usize, rules: Vec<AlertRule>) -> Self {
        let (dispatcher, queues) = Dispatcher::new(capacity, workers);
        let state = LiveState::new();
        let sink = AlertSinkHandle::spawn(
            Box::new(MemoryAlertStore::new(100_000)),
            SinkConfig::default(),
            None,
        );
        let pool = WorkerPool::spawn(
            queues,
            state.clone(),
            Arc::new(RuleSet::new(rules)),
            sink.clone(),
        );

        Self {
            dispatcher,
            state,
            sink,
            pool,
        }
    }

    pub fn session(&self, service_id: &str) -> IngestSession {
        IngestSession::new(service_id, self.dispatcher.clone(), self.state.clone())
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.pool.stats()
    }

    /// Close the dispatcher and wait for every worker to drain
    pub async fn finish(self) -> WorkerStats {
        let stats = self.pool.stats();
        self.dispatcher.close();
        let aborted = self.pool.stop(Duration::from_secs(10)).await;
        assert_eq!(aborted, 0, "workers should drain within the grace period");
        stats
    }
}

/// Hub configuration with an in-memory store and a random local port
pub fn hub_config(token: Option<&str>) -> Config {
    Config {
        workers: 4,
        queue_capacity: 32,
        storage: StorageConfig::Memory { capacity: 1000 },
        api: ApiSettings {
            bind: "127.0.0.1:0".parse().unwrap(),
            token: token.map(str::to_string),
            cors: true,
        },
        ..Config::default()
    }
}

/// Poll `check` until it returns true or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
