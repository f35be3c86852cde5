//! Configuration types for tradespike
//!
//! Defaults, overlaid by an optional TOML file, overlaid by the process
//! environment (after loading `.env`).

use crate::bus::Horizon;
use crate::detection::SpikeConfig;
use crate::feed::ProviderKind;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting absent
    #[error("{0} is not set")]
    Missing(&'static str),
    /// Setting present but unusable
    #[error("invalid {key}: {message}")]
    Invalid { key: String, message: String },
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aws: AwsConfig,
    pub stream: StreamConfig,
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub state: StateConfig,
    pub detection: DetectionConfig,
    pub api: ApiConfig,
    pub telemetry: TelemetryConfig,
}

/// Cloud settings shared by the bus and the object store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
        }
    }
}

/// Streaming bus settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: Option<String>,
    pub read_from: Horizon,
    /// Pause between shard reads
    pub poll_interval_ms: u64,
    /// Records requested per read
    pub read_limit: i32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: None,
            read_from: Horizon::Latest,
            poll_interval_ms: 500,
            read_limit: 1000,
        }
    }
}

/// Object store batching settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub bucket: Option<String>,
    /// Upload once this many records are buffered
    pub batch_size: usize,
    /// Upload once this long has passed since the last upload
    pub flush_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            batch_size: 10,
            flush_interval_secs: 5,
        }
    }
}

/// Upstream feed settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub provider: ProviderKind,
    /// Upstream pair, e.g. "XBT/USD"
    pub symbol: String,
    pub reconnect_delay_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Kraken,
            symbol: "XBT/USD".to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

/// State store location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp/securedataops_state"),
        }
    }
}

/// Spike detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Trailing seconds fed to the z-score
    #[serde(default = "default_window")]
    pub window: usize,

    /// One-sided z-score threshold
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Idle time before a heartbeat snapshot is written
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Per-second counts kept in memory
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_window() -> usize {
    30
}
fn default_threshold() -> f64 {
    3.0
}
fn default_heartbeat_secs() -> u64 {
    3
}
fn default_history_limit() -> usize {
    86_400 // one day of seconds
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window: 30,
            threshold: 3.0,
            heartbeat_secs: 3,
            history_limit: 86_400,
        }
    }
}

impl DetectionConfig {
    pub fn spike(&self) -> SpikeConfig {
        SpikeConfig {
            window: self.window,
            threshold: self.threshold,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Read API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub allow_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            allow_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus scrape port; exporter disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed: Result<T, T::Err> = value.trim().parse();
    parsed.map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Split a comma-separated origin list, dropping blanks
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand a leading `~` to the home directory
fn expand_home(path: PathBuf, home: Option<String>) -> PathBuf {
    let Some(home) = home else {
        return path;
    };
    match path.strip_prefix("~") {
        Ok(rest) => PathBuf::from(home).join(rest),
        Err(_) => path,
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, then `path` if it exists, then `.env` and the environment
    pub fn load_layered(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!(path = ?env_file, "Loaded .env");
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay settings found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AWS_DEFAULT_REGION") {
            self.aws.region = v;
        }
        if let Some(v) = get("KINESIS_STREAM_NAME") {
            self.stream.name = Some(v);
        }
        if let Some(v) = get("KINESIS_READ_FROM") {
            self.stream.read_from = parse_env("KINESIS_READ_FROM", &v)?;
        }
        if let Some(v) = get("S3_BUCKET") {
            self.store.bucket = Some(v);
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.store.batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("FLUSH_INTERVAL_SEC") {
            self.store.flush_interval_secs = parse_env("FLUSH_INTERVAL_SEC", &v)?;
        }
        if let Some(v) = get("PROVIDER") {
            self.feed.provider = parse_env("PROVIDER", &v)?;
        }
        if let Some(v) = get("SYMBOL") {
            self.feed.symbol = v;
        }
        if let Some(v) = get("SECUREDATAOPS_STATE_DIR") {
            self.state.dir = PathBuf::from(v);
        }
        if let Some(v) = get("API_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Some(v) = get("API_ALLOW_ORIGINS") {
            self.api.allow_origins = parse_origins(&v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.telemetry.log_level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.telemetry.log_format = parse_env("LOG_FORMAT", &v)?;
        }
        if let Some(v) = get("METRICS_PORT") {
            self.telemetry.metrics_port = Some(parse_env("METRICS_PORT", &v)?);
        }

        self.state.dir = expand_home(std::mem::take(&mut self.state.dir), lookup("HOME"));

        if self.store.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "batch_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.detection.window == 0 {
            return Err(ConfigError::Invalid {
                key: "detection.window".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.detection.history_limit < self.detection.window {
            return Err(ConfigError::Invalid {
                key: "detection.history_limit".into(),
                message: format!(
                    "{} is shorter than the detection window {}",
                    self.detection.history_limit, self.detection.window
                ),
            });
        }
        Ok(())
    }

    /// Stream name, required by the producer and the consumer
    pub fn require_stream(&self) -> Result<&str, ConfigError> {
        self.stream
            .name
            .as_deref()
            .ok_or(ConfigError::Missing("KINESIS_STREAM_NAME"))
    }

    /// Bucket name, required by the producer
    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.store
            .bucket
            .as_deref()
            .ok_or(ConfigError::Missing("S3_BUCKET"))
    }
}
