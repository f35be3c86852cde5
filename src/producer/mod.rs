//! Producer
//!
//! Holds one upstream subscription open, normalizes every trade, publishes it
//! to the streaming bus right away and buffers it for batched NDJSON uploads
//! to the object store. All state is mutated from the single receive loop.

mod batcher;

pub use batcher::{object_key, FlushReason, ObjectBatcher};

use crate::bus::{TradeBus, MAX_RECORDS_PER_CALL};
use crate::feed::{Provider, TradeRecord};
use crate::store::ObjectStore;
use crate::telemetry::{incr, set_gauge, CounterMetric, GaugeMetric};
use crate::ws::{self, SocketConfig, SocketEvent, SocketHandle};
use chrono::{SecondsFormat, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

/// How often the receive loop re-checks the time trigger while idle
const FLUSH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Producer settings
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Upstream pair, e.g. "XBT/USD"; also names the object key prefix
    pub symbol: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Fixed pause before reopening the socket
    pub reconnect_delay: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            symbol: "XBT/USD".to_string(),
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Producer counters
#[derive(Debug, Default, Clone)]
pub struct ProducerStats {
    pub frames_received: u64,
    pub frames_skipped: u64,
    pub records_received: u64,
    pub records_published: u64,
    pub publish_failures: u64,
    pub objects_uploaded: u64,
    pub upload_failures: u64,
}

/// Fans trades out to the bus and the object store
pub struct Producer<B: TradeBus, S: ObjectStore> {
    provider: Box<dyn Provider>,
    bus: B,
    store: S,
    batcher: ObjectBatcher,
    config: ProducerConfig,
    exiting: bool,
    stats: ProducerStats,
}

impl<B: TradeBus, S: ObjectStore> Producer<B, S> {
    /// Create a new producer
    pub fn new(provider: Box<dyn Provider>, bus: B, store: S, config: ProducerConfig) -> Self {
        let batcher = ObjectBatcher::new(config.batch_size, config.flush_interval, Instant::now());
        Self {
            provider,
            bus,
            store,
            batcher,
            config,
            exiting: false,
            stats: ProducerStats::default(),
        }
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    /// Records waiting for upload
    pub fn buffered(&self) -> usize {
        self.batcher.len()
    }

    /// Handle one text frame; returns the number of trades it carried
    pub async fn handle_frame(&mut self, text: &str) -> usize {
        self.stats.frames_received += 1;

        let mut records = match self.provider.decode(text) {
            Ok(records) => records,
            Err(e) => {
                self.stats.frames_skipped += 1;
                incr(CounterMetric::FramesSkipped, 1);
                tracing::warn!(provider = self.provider.name(), error = %e, "Skipping frame");
                return 0;
            }
        };
        if records.is_empty() {
            return 0;
        }

        let ingest_ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        for rec in &mut records {
            rec.ingest_ts = Some(ingest_ts.clone());
        }
        let count = records.len();
        self.stats.records_received += count as u64;

        self.publish(&records).await;

        for rec in records {
            self.batcher.push(rec);
            if self.batcher.due(Instant::now()) == Some(FlushReason::Size) {
                self.flush().await;
            }
        }
        self.flush_if_due().await;
        set_gauge(GaugeMetric::BufferedRecords, self.batcher.len() as f64);

        count
    }

    /// Publish to the bus in chunks; failures drop the affected records
    async fn publish(&mut self, records: &[TradeRecord]) {
        for chunk in records.chunks(MAX_RECORDS_PER_CALL) {
            match self.bus.put_records(chunk).await {
                Ok(()) => {
                    self.stats.records_published += chunk.len() as u64;
                    incr(CounterMetric::RecordsPublished, chunk.len() as u64);
                }
                Err(e) => {
                    self.stats.publish_failures += chunk.len() as u64;
                    incr(CounterMetric::PublishFailures, chunk.len() as u64);
                    tracing::warn!(
                        error = %e,
                        records = chunk.len(),
                        "Bus publish failed, dropping records"
                    );
                }
            }
        }
    }

    /// Flush if either trigger has fired
    pub async fn flush_if_due(&mut self) -> Option<FlushReason> {
        let reason = self.batcher.due(Instant::now())?;
        tracing::trace!(?reason, "Flush due");
        self.flush().await;
        Some(reason)
    }

    /// Upload the buffer as one NDJSON object
    ///
    /// On failure the buffer is kept and both triggers stay quiet for one
    /// flush interval, so an outage costs one upload attempt per interval.
    pub async fn flush(&mut self) -> bool {
        if self.batcher.is_empty() {
            return true;
        }

        let key = object_key(self.provider.name(), &self.config.symbol, Utc::now());
        let body = match self.batcher.body() {
            Ok(body) => body,
            Err(e) => {
                self.batcher.mark_failed(Instant::now());
                tracing::error!(error = %e, "Failed to encode batch");
                return false;
            }
        };
        let count = self.batcher.len();

        match self.store.put_object(&key, body).await {
            Ok(()) => {
                self.batcher.mark_flushed(Instant::now());
                self.stats.objects_uploaded += 1;
                incr(CounterMetric::ObjectsUploaded, 1);
                tracing::info!(count, key = %key, "Flushed batch to object store");
                true
            }
            Err(e) => {
                self.batcher.mark_failed(Instant::now());
                self.stats.upload_failures += 1;
                incr(CounterMetric::UploadFailures, 1);
                tracing::error!(error = %e, count, "Upload failed, keeping buffer");
                false
            }
        }
    }

    /// Run until `shutdown` flips to true
    ///
    /// Each connection is driven until it closes; the buffer is flushed on
    /// every close and the socket is reopened after the reconnect delay.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let socket_config = SocketConfig::new(self.provider.ws_url())
            .reconnect_delay(self.config.reconnect_delay);

        let mut flush_check = interval(FLUSH_CHECK_INTERVAL);
        flush_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.exiting = *shutdown.borrow();

        while !self.exiting {
            let SocketHandle {
                mut events,
                outgoing,
            } = ws::open(socket_config.clone());

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Shutdown requested, closing socket");
                            self.exiting = true;
                            break;
                        }
                    }

                    event = events.recv() => match event {
                        Some(SocketEvent::Connected) => {
                            incr(CounterMetric::Connections, 1);
                            if let Err(e) = self.provider.on_open(&outgoing).await {
                                tracing::warn!(error = %e, "Subscription failed");
                            }
                        }
                        Some(SocketEvent::Text(text)) => {
                            self.handle_frame(&text).await;
                        }
                        Some(SocketEvent::Binary(_)) => {}
                        Some(SocketEvent::Reconnecting { attempt }) => {
                            tracing::warn!(
                                attempt,
                                provider = self.provider.name(),
                                "Feed reconnecting"
                            );
                        }
                        Some(SocketEvent::Disconnected) | None => {
                            tracing::info!(provider = self.provider.name(), "Feed closed");
                            break;
                        }
                    },

                    _ = flush_check.tick() => {
                        self.flush_if_due().await;
                    }
                }
            }

            // Dropping the channels closes the socket
            drop(outgoing);
            drop(events);

            self.flush().await;

            if self.exiting {
                break;
            }

            tracing::info!(
                delay_secs = self.config.reconnect_delay.as_secs(),
                "Reopening feed"
            );
            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.exiting = true;
                    }
                }
            }
        }

        tracing::info!(
            published = self.stats.records_published,
            uploaded = self.stats.objects_uploaded,
            buffered = self.batcher.len(),
            "Producer stopped"
        );
        Ok(())
    }
}
