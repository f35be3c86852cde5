//! tradespike: crypto trade stream pipeline with spike detection
//!
//! This library provides the core components for:
//! - Real-time trade feeds from Kraken and Bitstamp
//! - Fan-out to a Kinesis stream and NDJSON batches in S3
//! - Per-second aggregation read back from the stream
//! - Windowed z-score spike detection
//! - A state directory with the latest metrics and an alert log
//! - A read-only HTTP API over the state directory
//! - Logging and Prometheus metrics

pub mod api;
pub mod bus;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod detection;
pub mod feed;
pub mod producer;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod ws;
