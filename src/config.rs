use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use crate::rules::{AlertRule, MetricName, RuleSet};

/// Errors raised while loading or validating the hub configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file provided: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Alert store configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Ring buffer in memory (no persistence)
    #[serde(alias = "none")]
    Memory {
        #[serde(default = "default_history_capacity")]
        capacity: usize,
    },

    /// SQLite database
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./alerts.db")
}

fn default_history_capacity() -> usize {
    crate::storage::memory::DEFAULT_CAPACITY
}

/// Alert sink tuning
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Alerts that may wait for the sink before workers block
    pub buffer: usize,

    /// Flush to the store once this many alerts are buffered
    pub batch_size: usize,

    /// Flush at least this often
    pub flush_interval_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer: 1024,
            batch_size: 50,
            flush_interval_ms: 1000,
        }
    }
}

impl SinkConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub bind: SocketAddr,

    /// Bearer token required on query routes
    pub token: Option<String>,

    pub cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((crate::util::get_addr(), crate::util::get_port())),
            token: None,
            cors: true,
        }
    }
}

/// Generic webhook receiving every raised alert
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size of the worker pool
    pub workers: usize,

    /// Total items the dispatcher holds before submitters block
    pub queue_capacity: usize,

    /// Interval handed to agents on registration
    pub report_interval_ms: u64,

    /// How long shutdown waits for queued work to drain
    pub drain_timeout_secs: u64,

    pub rules: Vec<AlertRule>,

    pub storage: StorageConfig,

    pub sink: SinkConfig,

    pub api: ApiSettings,

    pub webhook: Option<Webhook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
            report_interval_ms: 500,
            drain_timeout_secs: 5,
            rules: vec![
                AlertRule::new(MetricName::Cpu, 90.0),
                AlertRule::new(MetricName::Memory, 8000.0),
            ],
            storage: StorageConfig::default(),
            sink: SinkConfig::default(),
            api: ApiSettings::default(),
            webhook: None,
        }
    }
}

impl Config {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.rules.clone())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.sink.buffer == 0 || self.sink.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sink buffer and batch_size must be at least 1".into(),
            ));
        }
        if let Some(rule) = self.rules.iter().find(|rule| !rule.threshold.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "threshold for {} must be a finite number",
                rule.metric
            )));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_config(&file_content)
}
