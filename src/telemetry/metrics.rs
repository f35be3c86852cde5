//! Pipeline counters and gauges

/// Monotonic counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Records accepted by the bus
    RecordsPublished,
    /// Records lost to failed bus calls
    PublishFailures,
    /// Objects written to the cold store
    ObjectsUploaded,
    /// Failed object uploads
    UploadFailures,
    /// Frames or records dropped by a parser
    FramesSkipped,
    /// Seconds closed by the consumer
    SecondsFinalized,
    /// Spikes appended to the alert log
    Alerts,
    /// Heartbeat snapshots
    Heartbeats,
    /// WebSocket (re)connections
    Connections,
}

/// Point-in-time gauges
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Trades in the last finalized second
    TradesPerSec,
    /// Latest z-score
    ZScore,
    /// Records waiting for the next upload
    BufferedRecords,
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::RecordsPublished => "tradespike_records_published_total",
            CounterMetric::PublishFailures => "tradespike_publish_failures_total",
            CounterMetric::ObjectsUploaded => "tradespike_objects_uploaded_total",
            CounterMetric::UploadFailures => "tradespike_upload_failures_total",
            CounterMetric::FramesSkipped => "tradespike_frames_skipped_total",
            CounterMetric::SecondsFinalized => "tradespike_seconds_finalized_total",
            CounterMetric::Alerts => "tradespike_alerts_total",
            CounterMetric::Heartbeats => "tradespike_heartbeats_total",
            CounterMetric::Connections => "tradespike_ws_connections_total",
        }
    }
}

impl GaugeMetric {
    pub fn name(self) -> &'static str {
        match self {
            GaugeMetric::TradesPerSec => "tradespike_trades_per_sec",
            GaugeMetric::ZScore => "tradespike_zscore",
            GaugeMetric::BufferedRecords => "tradespike_buffered_records",
        }
    }
}

/// Add `value` to a counter
pub fn incr(metric: CounterMetric, value: u64) {
    ::metrics::counter!(metric.name()).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for m in [
            CounterMetric::RecordsPublished,
            CounterMetric::UploadFailures,
            CounterMetric::Alerts,
        ] {
            assert!(m.name().starts_with("tradespike_"));
            assert!(m.name().ends_with("_total"));
        }
        assert_eq!(GaugeMetric::ZScore.name(), "tradespike_zscore");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        incr(CounterMetric::FramesSkipped, 1);
        set_gauge(GaugeMetric::TradesPerSec, 10.0);
    }
}
