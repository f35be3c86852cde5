//! Consumer
//!
//! Reads the first shard of the stream, folds trades into per-second counts,
//! runs the spike detector on every closed second and publishes the result
//! to the state directory.

mod aggregator;

pub use aggregator::SecondAggregator;

use crate::bus::{BusError, Horizon, ShardReader};
use crate::config::Config;
use crate::detection::{round_z, SpikeConfig};
use crate::state::{Alert, MetricsSnapshot, StateError, StateStore};
use crate::telemetry::{incr, set_gauge, CounterMetric, GaugeMetric};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

/// Consecutive failed reads before the shard iterator is reopened
const REOPEN_AFTER_FAILURES: u32 = 3;

/// Consumer errors
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Stream has no shards to read
    #[error("no shards on stream {0}")]
    NoShards(String),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Consumer settings
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream_name: String,
    pub horizon: Horizon,
    /// Pause between shard reads
    pub poll_interval: Duration,
    /// Records requested per read
    pub read_limit: i32,
    pub spike: SpikeConfig,
    /// Idle time before a heartbeat snapshot is written
    pub heartbeat_interval: Duration,
    /// Bound on retained per-second counts
    pub history_limit: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            horizon: Horizon::Latest,
            poll_interval: Duration::from_millis(500),
            read_limit: 1000,
            spike: SpikeConfig::default(),
            heartbeat_interval: Duration::from_secs(3),
            history_limit: 86_400,
        }
    }
}

impl ConsumerConfig {
    pub fn from_config(stream_name: &str, config: &Config) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            horizon: config.stream.read_from,
            poll_interval: Duration::from_millis(config.stream.poll_interval_ms),
            read_limit: config.stream.read_limit,
            spike: config.detection.spike(),
            heartbeat_interval: config.detection.heartbeat_interval(),
            history_limit: config.detection.history_limit,
        }
    }
}

/// Consumer counters
#[derive(Debug, Default, Clone)]
pub struct ConsumerStats {
    pub records: u64,
    pub skipped: u64,
    pub seconds_finalized: u64,
    pub alerts: u64,
    pub heartbeats: u64,
    pub read_failures: u64,
    pub iterator_reopens: u64,
    pub write_failures: u64,
}

/// The only field the consumer needs from a bus record
#[derive(Deserialize)]
struct EventTime {
    timestamp: i64,
}

fn event_second(data: &[u8]) -> Result<i64, String> {
    let event: EventTime = serde_json::from_slice(data).map_err(|e| e.to_string())?;
    if event.timestamp <= 0 {
        return Err(format!("non-positive timestamp {}", event.timestamp));
    }
    Ok(event.timestamp.div_euclid(1000))
}

/// Shard reader plus per-second aggregation and detection
pub struct Consumer<R: ShardReader> {
    reader: R,
    state: StateStore,
    config: ConsumerConfig,
    aggregator: SecondAggregator,
    last_heartbeat: Instant,
    last_written_ms: i64,
    stats: ConsumerStats,
}

impl<R: ShardReader> Consumer<R> {
    pub fn new(reader: R, state: StateStore, config: ConsumerConfig) -> Self {
        let aggregator = SecondAggregator::new(config.history_limit);
        Self {
            reader,
            state,
            config,
            aggregator,
            last_heartbeat: Instant::now(),
            last_written_ms: 0,
            stats: ConsumerStats::default(),
        }
    }

    /// Open the state directory and build a consumer on it
    pub async fn open(
        reader: R,
        state_dir: impl Into<std::path::PathBuf>,
        config: ConsumerConfig,
    ) -> Result<Self, ConsumerError> {
        let state = StateStore::open(state_dir).await?;
        Ok(Self::new(reader, state, config))
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn aggregator(&self) -> &SecondAggregator {
        &self.aggregator
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Pick the first shard and open an iterator at the configured horizon
    pub async fn open_iterator(&self) -> Result<String, ConsumerError> {
        self.open_iterator_at(self.config.horizon).await
    }

    async fn open_iterator_at(&self, horizon: Horizon) -> Result<String, ConsumerError> {
        let shards = self.reader.list_shards().await?;
        let Some(shard_id) = shards.first() else {
            return Err(ConsumerError::NoShards(self.config.stream_name.clone()));
        };

        let iterator = self
            .reader
            .shard_iterator(shard_id, horizon)
            .await?;
        tracing::info!(
            stream = %self.config.stream_name,
            shard = %shard_id,
            read_from = %horizon,
            "Using shard"
        );
        Ok(iterator)
    }

    /// Fold a batch of raw records; returns how many were counted
    pub async fn process_records(&mut self, records: &[Vec<u8>]) -> usize {
        let mut counted = 0;
        for data in records {
            let sec = match event_second(data) {
                Ok(sec) => sec,
                Err(e) => {
                    self.stats.skipped += 1;
                    incr(CounterMetric::FramesSkipped, 1);
                    tracing::warn!(error = %e, "Skipping unparseable record");
                    continue;
                }
            };

            if let Some(count) = self.aggregator.observe(sec) {
                self.finalize(count).await;
            }
            self.stats.records += 1;
            counted += 1;
        }
        counted
    }

    /// Run the detector on the series and publish the closed second
    async fn finalize(&mut self, count: u64) {
        let (is_spike, z) = self.config.spike.evaluate(self.aggregator.history());
        let z = round_z(z);

        let snapshot = MetricsSnapshot {
            last_updated_ms: self.now_ms(),
            trades_per_sec: count,
            window_size: self.config.spike.window,
            z,
            is_spike,
        };

        self.stats.seconds_finalized += 1;
        incr(CounterMetric::SecondsFinalized, 1);
        set_gauge(GaugeMetric::TradesPerSec, count as f64);
        set_gauge(GaugeMetric::ZScore, z);

        self.write_snapshot(&snapshot).await;

        if is_spike {
            let alert = Alert {
                ts_ms: snapshot.last_updated_ms,
                count,
                z,
            };
            match self.state.append_alert(&alert).await {
                Ok(()) => {
                    self.stats.alerts += 1;
                    incr(CounterMetric::Alerts, 1);
                    tracing::warn!(count, z, "Trade spike detected");
                }
                Err(e) => {
                    self.stats.write_failures += 1;
                    tracing::error!(error = %e, count, z, "Failed to append alert");
                }
            }
        } else {
            tracing::debug!(count, z, "Second finalized");
        }
    }

    /// Write a heartbeat snapshot if nothing was written for too long
    pub async fn heartbeat_if_idle(&mut self) -> bool {
        if self.last_heartbeat.elapsed() <= self.config.heartbeat_interval {
            return false;
        }

        let snapshot = MetricsSnapshot::heartbeat(self.now_ms(), self.config.spike.window);
        self.write_snapshot(&snapshot).await;
        self.last_heartbeat = Instant::now();
        self.stats.heartbeats += 1;
        incr(CounterMetric::Heartbeats, 1);
        tracing::trace!("Heartbeat written");
        true
    }

    async fn write_snapshot(&mut self, snapshot: &MetricsSnapshot) {
        match self.state.write_metrics(snapshot).await {
            Ok(()) => self.last_written_ms = snapshot.last_updated_ms,
            Err(e) => {
                self.stats.write_failures += 1;
                tracing::error!(error = %e, "Failed to write metrics");
            }
        }
    }

    /// Wall clock in ms, never behind the last written snapshot
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis().max(self.last_written_ms)
    }

    /// Read until shutdown or until the shard closes
    ///
    /// Failed reads are retried with the same iterator. An expired iterator,
    /// or a run of failed reads, reopens the shard at `LATEST` so the series
    /// is never replayed.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let mut iterator = self.open_iterator().await?;
        tracing::info!(
            stream = %self.config.stream_name,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Reading stream"
        );

        let mut failures = 0u32;

        while !*shutdown.borrow() {
            match self
                .reader
                .get_records(&iterator, self.config.read_limit)
                .await
            {
                Ok(batch) => {
                    failures = 0;
                    if batch.records.is_empty() {
                        self.heartbeat_if_idle().await;
                    } else {
                        self.process_records(&batch.records).await;
                    }

                    match batch.next_iterator {
                        Some(next) => iterator = next,
                        None => {
                            tracing::info!("Shard closed, stopping");
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.stats.read_failures += 1;
                    failures += 1;
                    let expired = matches!(e, BusError::ExpiredIterator);
                    tracing::warn!(error = %e, failures, "Shard read failed");

                    if expired || failures >= REOPEN_AFTER_FAILURES {
                        match self.open_iterator_at(Horizon::Latest).await {
                            Ok(fresh) => {
                                iterator = fresh;
                                failures = 0;
                                self.stats.iterator_reopens += 1;
                            }
                            Err(e) => tracing::warn!(error = %e, "Reopening shard iterator failed"),
                        }
                    }
                }
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            records = self.stats.records,
            seconds = self.stats.seconds_finalized,
            alerts = self.stats.alerts,
            "Consumer stopped"
        );
        Ok(())
    }
}
